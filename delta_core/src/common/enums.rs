use strum_macros::{Display, EnumString};

/// Direction of the move on the day after an observed delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Direction {
    #[strum(serialize = "rise")]
    Rise,
    #[strum(serialize = "drop")]
    Drop,
}

impl Direction {
    /// A zero move counts as a rise
    pub fn of_delta(delta: f64) -> Self {
        if delta >= 0.0 {
            Direction::Rise
        } else {
            Direction::Drop
        }
    }
}
