use std::sync::Arc;

use opentelemetry::global::{BoxedTracer, ObjectSafeTracer};
use opentelemetry::propagation::{Extractor, TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::{noop::NoopTracer, SpanBuilder, TraceContextExt, Tracer};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

use sentra_api::TraceCarrier;

/// Tracer + propagator handed to every component that emits spans or
/// moves trace context across the log.
///
/// Nothing in the pipeline reads the ambient (thread-local) context: the
/// parent is always passed in as an explicit `Context`.
#[derive(Clone)]
pub struct Telemetry {
    tracer: Arc<BoxedTracer>,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl Telemetry {
    pub fn new(tracer: BoxedTracer, propagator: Arc<dyn TextMapPropagator + Send + Sync>) -> Self {
        Self { tracer: Arc::new(tracer), propagator }
    }

    /// Wrap any concrete tracer, with the W3C propagator.
    pub fn from_tracer<T>(tracer: T) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Send + Sync + 'static,
    {
        let boxed: Box<dyn ObjectSafeTracer + Send + Sync> = Box::new(tracer);
        Self::new(BoxedTracer::new(boxed), Arc::new(w3c_propagator()))
    }

    /// Tracer from the globally installed provider.
    pub fn global(name: &'static str) -> Self {
        Self::new(opentelemetry::global::tracer(name), Arc::new(w3c_propagator()))
    }

    /// Spans are created (so context still flows) but never recorded.
    pub fn noop() -> Self {
        Self::from_tracer(NoopTracer::new())
    }

    /// Serialize `cx` into a fresh carrier.
    pub fn inject(&self, cx: &Context) -> TraceCarrier {
        let mut carrier = TraceCarrier::new();
        self.propagator.inject_context(cx, &mut carrier);
        carrier
    }

    /// Rebuild a parent context from a carrier. Missing or garbled headers
    /// give an empty context, i.e. a new root trace.
    pub fn extract(&self, carrier: &TraceCarrier) -> Context {
        self.extract_from(carrier)
    }

    pub fn extract_from(&self, carrier: &dyn Extractor) -> Context {
        self.propagator.extract_with_context(&Context::new(), carrier)
    }

    /// Start a span as a child of `parent`; the span lives in the returned context.
    pub fn start(&self, builder: SpanBuilder, parent: &Context) -> Context {
        let span = self.tracer.build_with_context(builder, parent);
        parent.with_span(span)
    }
}

/// `traceparent`/`tracestate` plus `baggage`.
pub fn w3c_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Mark the span of `cx` as failed with `err` and end it.
pub(crate) fn end_with_error(cx: &Context, err: &(dyn std::error::Error + 'static)) {
    let span = cx.span();
    span.record_error(err);
    span.set_status(opentelemetry::trace::Status::error(err.to_string()));
    span.end();
}

pub(crate) fn end_ok(cx: &Context) {
    let span = cx.span();
    span.set_status(opentelemetry::trace::Status::Ok);
    span.end();
}
