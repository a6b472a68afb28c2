use sentra_proto::PriceUpdate;

// ═══════════════════════════════════════════════════════════════
//  Fixed batch
// ═══════════════════════════════════════════════════════════════

/// `count` updates cycling over `SKU-1..SKU-3`: price `100+i`, stock
/// `50-i`, timestamps `now+i` so every update of a SKU is newer than the
/// previous one.
pub fn fixed_batch(count: usize, now_ms: i64) -> Vec<PriceUpdate> {
    (0..count)
        .map(|i| PriceUpdate {
            sku: format!("SKU-{}", (i % 3) + 1),
            price: 100.0 + i as f64,
            stock: 50 - i as i32,
            ts_ms: Some(now_ms + i as i64),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════
//  Random walk
// ═══════════════════════════════════════════════════════════════

struct Product {
    sku: String,
    price: f64,
    stock: i32,
}

/// Prices move by up to ±1% per tick, stock drains and restocks.
pub struct RandomWalk {
    products: Vec<Product>,
    rng: Rng,
}

impl RandomWalk {
    pub fn new(skus: usize, seed: i64) -> Self {
        let mut rng = Rng::new(seed);
        let products = (1..=skus.max(1))
            .map(|n| Product {
                sku: format!("SKU-{n}"),
                price: 50.0 + rng.unit() * 150.0,
                stock: 20 + rng.below(80) as i32,
            })
            .collect();
        Self { products, rng }
    }

    pub fn next_update(&mut self, ts_ms: i64) -> PriceUpdate {
        let idx = self.rng.below(self.products.len());
        let step = (self.rng.unit() * 2.0 - 1.0) * 0.01;
        let restock = self.rng.below(10) == 0;
        let product = &mut self.products[idx];

        product.price = (product.price * (1.0 + step)).max(0.01);
        product.price = (product.price * 100.0).round() / 100.0;
        product.stock = if restock || product.stock == 0 { product.stock + 25 } else { product.stock - 1 };

        PriceUpdate {
            sku: product.sku.clone(),
            price: product.price,
            stock: product.stock,
            ts_ms: Some(ts_ms),
        }
    }

    pub fn batch(&mut self, count: usize, now_ms: i64) -> Vec<PriceUpdate> {
        (0..count).map(|i| self.next_update(now_ms + i as i64)).collect()
    }
}

// ═══════════════════════════════════════════════════════════════
//  RNG
// ═══════════════════════════════════════════════════════════════

/// xorshift64 seeded through one splitmix64 step, so any seed (including
/// negative ones and small neighbours) gives a well-mixed, non-zero state.
struct Rng(u64);

impl Rng {
    /// `0` seeds from the clock.
    fn new(seed: i64) -> Self {
        let seed = match seed {
            0 => std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9E37_79B9),
            s => s as u64,
        };
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self((z ^ (z >> 31)).max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `[0, n)`; always 0 when `n` is 0.
    fn below(&mut self, n: usize) -> usize {
        match n {
            0 => 0,
            n => (self.next_u64() % n as u64) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_batch_cycles_three_skus() {
        let batch = fixed_batch(10, 1_000);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch[0].sku, "SKU-1");
        assert_eq!(batch[4].sku, "SKU-2");
        assert_eq!((batch[3].price, batch[3].stock, batch[3].ts_ms), (103.0, 47, Some(1_003)));
    }

    #[test]
    fn same_seed_same_walk() {
        let a = RandomWalk::new(3, 42).batch(20, 0);
        let b = RandomWalk::new(3, 42).batch(20, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn rng_handles_edge_seeds_and_empty_ranges() {
        let mut rng = Rng::new(-1);
        assert_eq!(rng.below(0), 0);
        for _ in 0..100 {
            assert!(rng.below(3) < 3);
            let u = rng.unit();
            assert!((0.0..1.0).contains(&u));
        }
        assert_ne!(Rng::new(1).next_u64(), Rng::new(2).next_u64());
    }

    #[test]
    fn walk_keeps_values_sane() {
        let mut walk = RandomWalk::new(2, 7);
        for update in walk.batch(500, 0) {
            assert!(update.price > 0.0);
            assert!(update.stock >= 0);
            assert!(update.sku == "SKU-1" || update.sku == "SKU-2");
        }
    }
}
