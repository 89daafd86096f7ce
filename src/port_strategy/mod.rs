//! Provides a means to hold the port set of a scan and walk it per target.
mod range_iterator;
use crate::input::ScanOrder;
pub use range_iterator::{merge, RangeIterator};

/// Represents options of port scanning.
///
/// Ports are held as merged ranges, so even a full `1-65535` scan costs a
/// single pair and no per-port storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortStrategy {
    Serial(SerialRange),
    Random(RandomRange),
}

impl PortStrategy {
    pub fn pick(ports: &[u16], order: ScanOrder) -> Self {
        let range = merge(ports);
        match order {
            ScanOrder::Serial => PortStrategy::Serial(SerialRange { range }),
            ScanOrder::Random => PortStrategy::Random(RandomRange { range }),
        }
    }

    /// Starts a new walk over the port set.
    pub fn order(&self) -> RangeIterator {
        match self {
            PortStrategy::Serial(range) => range.generate(),
            PortStrategy::Random(range) => range.generate(),
        }
    }

    /// Number of distinct ports.
    pub fn len(&self) -> usize {
        let range = match self {
            PortStrategy::Serial(r) => &r.range,
            PortStrategy::Random(r) => &r.range,
        };
        range
            .iter()
            .map(|&(s, e)| usize::from(e - s) + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait associated with a port strategy. Each PortStrategy must be able
/// to generate an order for a pass over its ports.
trait RangeOrder {
    fn generate(&self) -> RangeIterator;
}

/// As the name implies SerialRange will always walk the ports in
/// ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialRange {
    range: Vec<(u16, u16)>,
}

impl RangeOrder for SerialRange {
    fn generate(&self) -> RangeIterator {
        RangeIterator::new_serial(&self.range)
    }
}

/// RandomRange walks the ports in a random order that is drawn again for
/// every pass, so consecutive targets do not see the same sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomRange {
    range: Vec<(u16, u16)>,
}

impl RangeOrder for RandomRange {
    fn generate(&self) -> RangeIterator {
        RangeIterator::new_random(&self.range)
    }
}

/// Stateful cursor over the configured port set, rewound once per target.
///
/// A fresh iterator has no pass in progress: [`PortIterator::next_port`]
/// returns `None` until [`PortIterator::begin`] is called.
#[derive(Debug, Clone)]
pub struct PortIterator {
    strategy: PortStrategy,
    pass: Option<RangeIterator>,
}

impl PortIterator {
    pub fn new(strategy: PortStrategy) -> Self {
        Self {
            strategy,
            pass: None,
        }
    }

    /// Begins a fresh pass over the current port set.
    pub fn begin(&mut self) {
        self.pass = Some(self.strategy.order());
    }

    /// Replaces the port set and begins a pass over it.
    pub fn begin_with(&mut self, strategy: PortStrategy) {
        self.strategy = strategy;
        self.begin();
    }

    /// Next port of the pass, `None` once the pass is exhausted.
    pub fn next_port(&mut self) -> Option<u16> {
        let port = self.pass.as_mut()?.next();
        if port.is_none() {
            self.pass = None;
        }
        port
    }

    pub fn strategy(&self) -> &PortStrategy {
        &self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::{PortIterator, PortStrategy};
    use crate::input::ScanOrder;

    fn drain(it: &mut PortIterator) -> Vec<u16> {
        std::iter::from_fn(|| it.next_port()).collect()
    }

    #[test]
    fn serial_strategy_with_ports() {
        let strategy = PortStrategy::pick(&[443, 80, 22, 23], ScanOrder::Serial);
        assert_eq!(strategy.order().collect::<Vec<_>>(), vec![22, 23, 80, 443]);
        assert_eq!(strategy.len(), 4);
    }

    #[test]
    fn random_strategy_with_ports() {
        let ports: Vec<u16> = (1..=1000).collect();
        let strategy = PortStrategy::pick(&ports, ScanOrder::Random);
        let mut result: Vec<u16> = strategy.order().collect();
        assert_ne!(ports, result);

        result.sort_unstable();
        assert_eq!(ports, result);
    }

    #[test]
    fn passes_restart_on_begin() {
        let mut it = PortIterator::new(PortStrategy::pick(&[1, 2, 3], ScanOrder::Serial));
        assert_eq!(it.next_port(), None);

        it.begin();
        assert_eq!(drain(&mut it), vec![1, 2, 3]);
        assert_eq!(it.next_port(), None);

        it.begin();
        assert_eq!(it.next_port(), Some(1));
        it.begin();
        assert_eq!(drain(&mut it), vec![1, 2, 3]);
    }

    #[test]
    fn begin_with_swaps_the_port_set() {
        let mut it = PortIterator::new(PortStrategy::pick(&[1, 2, 3], ScanOrder::Serial));
        it.begin_with(PortStrategy::pick(&[8080, 80], ScanOrder::Serial));
        assert_eq!(drain(&mut it), vec![80, 8080]);
        assert_eq!(it.strategy().len(), 2);
    }

    #[test]
    fn random_passes_cover_the_set_every_time() {
        let ports: Vec<u16> = (100..=199).collect();
        let mut it = PortIterator::new(PortStrategy::pick(&ports, ScanOrder::Random));
        for _ in 0..5 {
            it.begin();
            let mut pass = drain(&mut it);
            pass.sort_unstable();
            assert_eq!(pass, ports);
        }
    }
}
