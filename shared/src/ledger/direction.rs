//! Movement direction lookup
//!
//! The same movement is inbound for one observer and outbound for another:
//! an `exit` leaves the warehouse and arrives at the job site. This table is
//! the only place that decides it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::conversion::to_pieces;
use crate::models::{Movement, MovementType};

/// Who is looking at the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Warehouse,
    JobSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    pub fn sign(&self) -> Decimal {
        match self {
            Direction::In => Decimal::ONE,
            Direction::Out => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Direction of a movement kind as seen by an observer
pub fn direction(movement_type: MovementType, perspective: Perspective) -> Direction {
    use MovementType::*;

    match (perspective, movement_type) {
        (Perspective::Warehouse, Purchase | Load | Entry) => Direction::In,
        (Perspective::Warehouse, Unload | Exit | Sale) => Direction::Out,
        (Perspective::JobSite, Purchase | Unload | Exit) => Direction::In,
        (Perspective::JobSite, Load | Entry | Sale) => Direction::Out,
    }
}

/// Pieces carried by a movement, derived from its coefficient snapshot when not recorded
pub fn movement_pieces(movement: &Movement) -> Decimal {
    movement
        .pieces
        .unwrap_or_else(|| to_pieces(movement.quantity, movement.coefficient))
}

/// Quantity signed for the observer
pub fn signed_quantity(movement: &Movement, perspective: Perspective) -> Decimal {
    direction(movement.movement_type, perspective).sign() * movement.quantity
}

/// Pieces signed for the observer
pub fn signed_pieces(movement: &Movement, perspective: Perspective) -> Decimal {
    direction(movement.movement_type, perspective).sign() * movement_pieces(movement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warehouse_directions() {
        assert_eq!(direction(MovementType::Purchase, Perspective::Warehouse), Direction::In);
        assert_eq!(direction(MovementType::Load, Perspective::Warehouse), Direction::In);
        assert_eq!(direction(MovementType::Entry, Perspective::Warehouse), Direction::In);
        assert_eq!(direction(MovementType::Unload, Perspective::Warehouse), Direction::Out);
        assert_eq!(direction(MovementType::Exit, Perspective::Warehouse), Direction::Out);
        assert_eq!(direction(MovementType::Sale, Perspective::Warehouse), Direction::Out);
    }

    #[test]
    fn test_job_site_directions() {
        assert_eq!(direction(MovementType::Purchase, Perspective::JobSite), Direction::In);
        assert_eq!(direction(MovementType::Unload, Perspective::JobSite), Direction::In);
        assert_eq!(direction(MovementType::Exit, Perspective::JobSite), Direction::In);
        assert_eq!(direction(MovementType::Load, Perspective::JobSite), Direction::Out);
        assert_eq!(direction(MovementType::Entry, Perspective::JobSite), Direction::Out);
    }

    #[test]
    fn test_unload_and_exit_flip_between_observers() {
        for kind in [MovementType::Unload, MovementType::Exit, MovementType::Load, MovementType::Entry] {
            assert_ne!(
                direction(kind, Perspective::Warehouse),
                direction(kind, Perspective::JobSite),
                "{} should flip",
                kind.as_str()
            );
        }
    }
}
