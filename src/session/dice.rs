use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use thiserror::Error;

use crate::constants::MAX_DICE_PER_KIND;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DieKind {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieKind {
    pub const ALL: [DieKind; 7] = [
        Self::D4,
        Self::D6,
        Self::D8,
        Self::D10,
        Self::D12,
        Self::D20,
        Self::D100,
    ];

    pub fn sides(self) -> u32 {
        match self {
            Self::D4 => 4,
            Self::D6 => 6,
            Self::D8 => 8,
            Self::D10 => 10,
            Self::D12 => 12,
            Self::D20 => 20,
            Self::D100 => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::D4 => "d4",
            Self::D6 => "d6",
            Self::D8 => "d8",
            Self::D10 => "d10",
            Self::D12 => "d12",
            Self::D20 => "d20",
            Self::D100 => "d100",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for DieKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DieRoll {
    pub count: u32,
    pub total: u32,
}

/// Die counts as submitted by a client, e.g. `{"d6": 2, "d20": null}`.
pub type DiceCounts = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("unknown die kind: {0}")]
    UnknownDie(String),
    #[error("malformed roll segment: {0}")]
    Malformed(String),
}

/// The dice a participant rolls at once; only kinds with a positive count are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiceTable {
    dice: BTreeMap<DieKind, DieRoll>,
}

impl DiceTable {
    /// Counts are rounded, non-positive or missing counts drop the kind, and large counts
    /// clamp to the per-kind maximum.
    pub fn from_counts(counts: &DiceCounts) -> Result<Self, DiceError> {
        let mut dice = BTreeMap::new();
        for (name, raw) in counts {
            let kind = DieKind::parse(name).ok_or_else(|| DiceError::UnknownDie(name.clone()))?;
            if let Some(count) = normalize_count(*raw) {
                dice.insert(kind, DieRoll { count, total: 0 });
            }
        }
        Ok(Self { dice })
    }

    pub fn is_empty(&self) -> bool {
        self.dice.is_empty()
    }

    pub fn get(&self, kind: DieKind) -> Option<DieRoll> {
        self.dice.get(&kind).copied()
    }

    /// Re-roll every die, replacing previous totals.
    pub fn roll<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for (kind, die) in self.dice.iter_mut() {
            die.total = (0..die.count).map(|_| rng.gen_range(1..=kind.sides())).sum();
        }
    }

    /// `"<count>:<die>:<total>"` per kind, comma separated, in die order.
    pub fn to_payload(&self) -> String {
        self.dice
            .iter()
            .map(|(kind, die)| format!("{}:{}:{}", die.count, kind, die.total))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Inverse of [`DiceTable::to_payload`]. Unknown die kinds are ignored, counts clamp
    /// to the per-kind maximum, and a total no roll of that many dice could produce is
    /// rejected.
    pub fn parse_payload(payload: &str) -> Result<Self, DiceError> {
        let mut dice = BTreeMap::new();
        for segment in payload.split(',').filter(|s| !s.trim().is_empty()) {
            let parts: Vec<&str> = segment.trim().split(':').collect();
            let [count, kind, total] = parts.as_slice() else {
                return Err(DiceError::Malformed(segment.to_string()));
            };
            let Some(kind) = DieKind::parse(kind) else {
                continue;
            };
            let count: u32 = count
                .parse()
                .map_err(|_| DiceError::Malformed(segment.to_string()))?;
            let total: u32 = total
                .parse()
                .map_err(|_| DiceError::Malformed(segment.to_string()))?;
            if count == 0 {
                continue;
            }
            let count = count.min(MAX_DICE_PER_KIND);
            if !(count..=count * kind.sides()).contains(&total) {
                return Err(DiceError::Malformed(segment.to_string()));
            }
            dice.insert(kind, DieRoll { count, total });
        }
        Ok(Self { dice })
    }
}

fn normalize_count(raw: Option<f64>) -> Option<u32> {
    let raw = raw?;
    if !raw.is_finite() {
        return None;
    }
    let rounded = raw.round();
    if rounded <= 0.0 {
        return None;
    }
    Some(rounded.min(f64::from(MAX_DICE_PER_KIND)) as u32)
}
