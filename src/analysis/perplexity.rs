/// Sign of a score: +1 White better, -1 Black better, 0 level.
pub const fn sign_bucket(cp: i32) -> i8 {
    if cp > 0 {
        1
    } else if cp < 0 {
        -1
    } else {
        0
    }
}

/// Replaces each level reading with the last decided one. Leading zeros stay.
pub fn carry_forward(buckets: &[i8]) -> Vec<i8> {
    let mut last = 0;
    buckets
        .iter()
        .map(|&b| {
            if b != 0 {
                last = b;
            }
            last
        })
        .collect()
}

/// How many times the favored side changes as depth grows, plus one.
///
/// Scores go shallow to deep. A series that never leaves zero counts as one
/// segment. The count is not capped.
pub fn perplexity_segments(cps_by_depth: &[i32]) -> usize {
    let buckets: Vec<i8> = cps_by_depth.iter().map(|&cp| sign_bucket(cp)).collect();
    let carried = carry_forward(&buckets);

    let mut segments = 0;
    let mut prev = 0;
    for b in carried.into_iter().filter(|&b| b != 0) {
        if b != prev {
            segments += 1;
            prev = b;
        }
    }
    segments.max(1)
}
