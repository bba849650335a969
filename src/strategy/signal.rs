//! Directional signals that strategies can compose.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::models::{BarData, TickData};

/// Signed position bias held by a signal. Only changed through
/// [`CtaSignal::set_signal_pos`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalPosition(Decimal);

impl SignalPosition {
    pub fn get(&self) -> Decimal {
        self.0
    }

    fn set(&mut self, pos: Decimal) {
        self.0 = pos;
    }
}

/// A reusable directional opinion. Has no access to order placement.
pub trait CtaSignal: Send {
    fn position(&self) -> &SignalPosition;

    fn position_mut(&mut self) -> &mut SignalPosition;

    fn on_tick(&mut self, _tick: &TickData) {}

    fn on_bar(&mut self, _bar: &BarData) {}

    fn set_signal_pos(&mut self, pos: Decimal) {
        self.position_mut().set(pos);
    }

    fn get_signal_pos(&self) -> Decimal {
        self.position().get()
    }
}

/// Moving-average crossover over bar closes.
///
/// Long `fixed_size` while the fast average is above the slow one, short
/// while below, flat when equal. Holds zero until the slow window fills.
pub struct MaCrossSignal {
    fast_window: usize,
    slow_window: usize,
    fixed_size: Decimal,
    closes: VecDeque<Decimal>,
    position: SignalPosition,
}

impl MaCrossSignal {
    pub fn new(fast_window: usize, slow_window: usize, fixed_size: Decimal) -> Self {
        let fast_window = fast_window.max(1);
        let slow_window = slow_window.max(fast_window);
        Self {
            fast_window,
            slow_window,
            fixed_size,
            closes: VecDeque::with_capacity(slow_window),
            position: SignalPosition::default(),
        }
    }

    /// Averages once the slow window is full: `(fast, slow)`.
    pub fn averages(&self) -> Option<(Decimal, Decimal)> {
        if self.closes.len() < self.slow_window {
            return None;
        }

        let slow = mean(self.closes.iter());
        let fast = mean(self.closes.iter().skip(self.slow_window - self.fast_window));
        Some((fast, slow))
    }
}

fn mean<'a>(values: impl ExactSizeIterator<Item = &'a Decimal>) -> Decimal {
    let count = values.len();
    if count == 0 {
        return Decimal::ZERO;
    }
    values.sum::<Decimal>() / Decimal::from(count)
}

impl CtaSignal for MaCrossSignal {
    fn position(&self) -> &SignalPosition {
        &self.position
    }

    fn position_mut(&mut self) -> &mut SignalPosition {
        &mut self.position
    }

    fn on_bar(&mut self, bar: &BarData) {
        if self.closes.len() == self.slow_window {
            self.closes.pop_front();
        }
        self.closes.push_back(bar.close_price);

        if let Some((fast, slow)) = self.averages() {
            let pos = if fast > slow {
                self.fixed_size
            } else if fast < slow {
                -self.fixed_size
            } else {
                Decimal::ZERO
            };
            self.set_signal_pos(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct FixedSignal {
        position: SignalPosition,
    }

    impl CtaSignal for FixedSignal {
        fn position(&self) -> &SignalPosition {
            &self.position
        }

        fn position_mut(&mut self) -> &mut SignalPosition {
            &mut self.position
        }
    }

    fn make_bar(close: Decimal) -> BarData {
        BarData {
            vt_symbol: "IF2401.CFFEX".to_string(),
            datetime: Utc::now(),
            interval: Interval::Minute,
            open_price: close,
            high_price: close,
            low_price: close,
            close_price: close,
            volume: Decimal::ZERO,
            open_interest: Decimal::ZERO,
        }
    }

    #[test]
    fn test_signal_defaults_to_zero() {
        let mut signal = FixedSignal {
            position: SignalPosition::default(),
        };
        assert_eq!(signal.get_signal_pos(), Decimal::ZERO);

        signal.set_signal_pos(dec!(-3));
        assert_eq!(signal.get_signal_pos(), dec!(-3));
    }

    #[test]
    fn test_ma_cross_waits_for_slow_window() {
        let mut signal = MaCrossSignal::new(2, 4, dec!(1));
        for close in [dec!(10), dec!(11), dec!(12)] {
            signal.on_bar(&make_bar(close));
        }
        assert_eq!(signal.averages(), None);
        assert_eq!(signal.get_signal_pos(), Decimal::ZERO);

        signal.on_bar(&make_bar(dec!(13)));
        // fast = (12 + 13) / 2, slow = (10 + 11 + 12 + 13) / 4
        assert_eq!(signal.averages(), Some((dec!(12.5), dec!(11.5))));
        assert_eq!(signal.get_signal_pos(), dec!(1));
    }

    #[test]
    fn test_ma_cross_flips_short() {
        let mut signal = MaCrossSignal::new(2, 3, dec!(2));
        for close in [dec!(10), dec!(10), dec!(10)] {
            signal.on_bar(&make_bar(close));
        }
        assert_eq!(signal.get_signal_pos(), Decimal::ZERO);

        signal.on_bar(&make_bar(dec!(7)));
        // window [10, 10, 7]: fast 8.5 < slow 9
        assert_eq!(signal.get_signal_pos(), dec!(-2));
    }
}
