//! 凭据打散用的随机数：每线程一个 splitmix64 计数器，初值取自 uuid v4。
//!
//! 不是密码学随机源。

use std::cell::Cell;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

thread_local! {
    static COUNTER: Cell<u64> = Cell::new(initial_counter());
}

fn initial_counter() -> u64 {
    let bits = uuid::Uuid::new_v4().as_u128();
    mix((bits >> 64) as u64) ^ bits as u64
}

// splitmix64 终混函数。
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn next_u64() -> u64 {
    COUNTER.with(|c| {
        let next = c.get().wrapping_add(GOLDEN_GAMMA);
        c.set(next);
        mix(next)
    })
}

/// 返回 `[0, upper)` 内的随机数；拒绝采样消除取模偏差。
pub fn random_below(upper: usize) -> usize {
    if upper <= 1 {
        return 0;
    }
    let upper = upper as u64;
    let zone = u64::MAX - (u64::MAX % upper);
    loop {
        let v = next_u64();
        if v < zone {
            return (v % upper) as usize;
        }
    }
}

/// Fisher–Yates 原地洗牌。
pub fn shuffle<T>(items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = random_below(i + 1);
        items.swap(i, j);
    }
}
