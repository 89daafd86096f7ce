use gcd::Gcd;
use rand::Rng;

/// Yields every port of a set of merged, ascending ranges exactly once.
///
/// Ports are addressed by their index `0..N` in the concatenation of the
/// ranges. The iterator walks the indices with the additive step
/// `x_{i+1} = (x_i + step) % N`:
///
///  - **Serial**: `step = 1`, `x_0 = 0`, so ports come out ascending.
///  - **Random**: `step` is chosen so `gcd(step, N) == 1`, which makes the
///    walk a full-length cycle, and `x_0` is uniform in `0..N`.
///
///    For more information: <https://en.wikipedia.org/wiki/Linear_congruential_generator>
#[derive(Debug, Clone)]
pub struct RangeIterator {
    active: bool,
    total: u32,
    first_pick: u32,
    pick: u32,
    step: u32,
    ranges: Vec<(u32, u32)>,
    prefix: Vec<u32>,
}

impl RangeIterator {
    /// Ascending walk over `ranges` (inclusive, as produced by [`merge`]).
    pub fn new_serial(ranges: &[(u16, u16)]) -> Self {
        Self::with_walk(ranges, |_| (1, 0))
    }

    /// Random full-cycle walk over `ranges`. Every call draws a fresh step
    /// and starting point.
    pub fn new_random(ranges: &[(u16, u16)]) -> Self {
        Self::with_walk(ranges, |total| {
            let step = pick_random_coprime(total);
            let first = rand::rng().random_range(0..total);
            (step, first)
        })
    }

    fn with_walk(ranges: &[(u16, u16)], walk: impl FnOnce(u32) -> (u32, u32)) -> Self {
        // (start, len) pairs; prefix[0] = 0, prefix.len() == ranges.len() + 1
        let ranges: Vec<(u32, u32)> = ranges
            .iter()
            .map(|&(s, e)| (u32::from(s), u32::from(e) - u32::from(s) + 1))
            .collect();
        let prefix = ranges.iter().fold(vec![0u32], |mut acc, (_, len)| {
            let last = acc.last().copied().unwrap_or_default();
            acc.push(last + len);
            acc
        });
        let total = prefix.last().copied().unwrap_or_default();

        let (step, first) = if total == 0 { (0, 0) } else { walk(total) };

        Self {
            active: total > 0,
            total,
            first_pick: first,
            pick: first,
            step,
            ranges,
            prefix,
        }
    }

    /// Number of ports in one full walk.
    pub fn total(&self) -> u32 {
        self.total
    }

    fn port_at(&self, index: u32) -> Option<u16> {
        // first range whose end lies past `index`
        let idx = self.prefix[1..].partition_point(|&end| end <= index);
        let (start, _) = self.ranges.get(idx)?;
        u16::try_from(start + (index - self.prefix[idx])).ok()
    }
}

impl Iterator for RangeIterator {
    type Item = u16;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.active {
            return None;
        }

        let cur = self.pick;
        let next = (cur + self.step) % self.total;
        // back at the seed: `cur` was the last index of the cycle
        if next == self.first_pick {
            self.active = false;
        }
        self.pick = next;

        self.port_at(cur)
    }
}

/// Collapses a port list into sorted, disjoint inclusive ranges.
///
/// `[80, 81, 82, 443, 22, 80]` becomes `[(22, 22), (80, 82), (443, 443)]`.
pub fn merge(ports: &[u16]) -> Vec<(u16, u16)> {
    let mut sorted = ports.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut merged: Vec<(u16, u16)> = Vec::new();
    for port in sorted {
        match merged.last_mut() {
            Some((_, end)) if u32::from(*end) + 1 == u32::from(port) => *end = port,
            _ => merged.push((port, port)),
        }
    }
    merged
}

/// The probability that two random integers are coprime to one another
/// works out to be around 61%, given that we can safely pick a random
/// number and test it. Just in case we are having a bad day and we cannot
/// pick a coprime number after 10 tries we just return "end - 1" which
/// is guaranteed to be a coprime, but won't provide ideal randomization.
///
/// We pick between "lower_range" and "upper_range" since values too close to
/// the boundaries would also provide non-ideal randomization.
fn pick_random_coprime(end: u32) -> u32 {
    if end <= 2 {
        return 1;
    }
    let range_boundary = end / 4;
    let lower_range = range_boundary.max(1);
    let upper_range = end - range_boundary;
    let mut rng = rand::rng();

    for _ in 0..10 {
        let candidate = rng.random_range(lower_range..upper_range);
        if end.gcd(candidate) == 1 {
            return candidate;
        }
    }

    end - 1
}
