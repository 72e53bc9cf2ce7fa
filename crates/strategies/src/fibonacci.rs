use crate::error::StrategyError;
use core_types::ZoneCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// One rung of the level ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub name: &'static str,
    pub ratio: Decimal,
    pub price: Decimal,
    /// Zone entered when price closes below this level from at or above it.
    pub down_zone: Option<ZoneCode>,
    /// Zone entered when price closes above this level from at or below it.
    pub up_zone: Option<ZoneCode>,
}

impl Level {
    /// Display-only levels take part in neither crossing scan.
    pub fn is_transition(&self) -> bool {
        self.down_zone.is_some() && self.up_zone.is_some()
    }
}

// (name, ratio, down zone, up zone), ascending by ratio.
const EXTENDED_RUNGS: [(&str, Decimal, i8, i8); 3] = [
    ("fibo_n200", dec!(-1.0), -5, -4),
    ("fibo_n161", dec!(-0.618), -3, -2),
    ("fibo_n138", dec!(-0.382), -1, 0),
];

const CORE_RUNGS: [(&str, Decimal, Option<(i8, i8)>); 9] = [
    ("fibo_base", dec!(0), Some((1, 2))),
    ("fibo_38", dec!(0.382), Some((3, 4))),
    ("fibo_50", dec!(0.5), Some((5, 6))),
    ("fibo_61", dec!(0.618), Some((7, 8))),
    ("fibo_top", dec!(1.0), Some((9, 10))),
    ("fibo_138", dec!(1.382), Some((11, 12))),
    ("fibo_150", dec!(1.5), None),
    ("fibo_161", dec!(1.618), Some((13, 14))),
    ("fibo_200", dec!(2.0), Some((15, 16))),
];

/// An immutable ladder of retracement levels derived from a base and top price.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSet {
    base: Decimal,
    top: Decimal,
    extended: bool,
    /// Strictly increasing in price.
    levels: Vec<Level>,
}

impl LevelSet {
    pub fn base(&self) -> Decimal {
        self.base
    }

    pub fn top(&self) -> Decimal {
        self.top
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Every level, including display-only ones, lowest price first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Looks a level up by its export name, e.g. `"fibo_50"`.
    pub fn price_of(&self, name: &str) -> Option<Decimal> {
        self.levels.iter().find(|l| l.name == name).map(|l| l.price)
    }

    fn transitions(&self) -> impl DoubleEndedIterator<Item = &Level> {
        self.levels.iter().filter(|l| l.is_transition())
    }
}

/// Derives the level ladder for `base < top`.
///
/// Each level sits at `base + ratio * (top - base)`. The extended ladder adds
/// the three rungs below the base.
pub fn compute_levels(base: Decimal, top: Decimal, extended: bool) -> Result<LevelSet, StrategyError> {
    if top <= base {
        return Err(StrategyError::InvalidRange { base, top });
    }
    let size = top - base;

    let mut levels = Vec::with_capacity(CORE_RUNGS.len() + EXTENDED_RUNGS.len());
    if extended {
        levels.extend(EXTENDED_RUNGS.iter().map(|&(name, ratio, down, up)| Level {
            name,
            ratio,
            price: base + ratio * size,
            down_zone: Some(ZoneCode(down)),
            up_zone: Some(ZoneCode(up)),
        }));
    }
    levels.extend(CORE_RUNGS.iter().map(|&(name, ratio, zones)| Level {
        name,
        ratio,
        price: base + ratio * size,
        down_zone: zones.map(|(down, _)| ZoneCode(down)),
        up_zone: zones.map(|(_, up)| ZoneCode(up)),
    }));

    Ok(LevelSet {
        base,
        top,
        extended,
        levels,
    })
}

/// Returns the zone entered by moving from `prev_close` to `close`, if any level was crossed.
///
/// A downward crossing (`close < level <= prev_close`) is resolved at the
/// lowest crossed level; an upward crossing (`prev_close <= level < close`) at
/// the highest. Both cannot hold for the same pair of prices. `None` means the
/// zone carries over from the previous sample.
pub fn classify(prev_close: Decimal, close: Decimal, levels: &LevelSet) -> Option<ZoneCode> {
    if let Some(level) = levels
        .transitions()
        .find(|l| close < l.price && prev_close >= l.price)
    {
        return level.down_zone;
    }

    levels
        .transitions()
        .rev()
        .find(|l| close > l.price && prev_close <= l.price)
        .and_then(|l| l.up_zone)
}
