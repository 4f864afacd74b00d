//! Structuring elements for binary morphology

use s2cuts_core::{Error, Result};

/// Shape of a structuring element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuringElement {
    /// Square element of given radius (side = 2*radius + 1)
    Square(usize),
    /// Cross (plus-shaped) element of given radius
    Cross(usize),
}

impl Default for StructuringElement {
    fn default() -> Self {
        StructuringElement::Square(1)
    }
}

impl StructuringElement {
    /// Reject zero-radius elements
    pub fn validate(&self) -> Result<()> {
        if self.radius() == 0 {
            return Err(Error::InvalidParameter {
                name: "radius",
                value: "0".to_string(),
                reason: "structuring element radius must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn radius(&self) -> usize {
        match self {
            StructuringElement::Square(r) | StructuringElement::Cross(r) => *r,
        }
    }

    /// (dr, dc) offsets of the active cells relative to the center
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        match self {
            StructuringElement::Square(_) => (-r..=r)
                .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
                .collect(),
            StructuringElement::Cross(_) => (-r..=r)
                .map(|d| (d, 0))
                .chain((-r..=r).filter(|&d| d != 0).map(|d| (0, d)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_offsets() {
        let offsets = StructuringElement::Square(1).offsets();
        assert_eq!(offsets.len(), 9);
        assert!(offsets.contains(&(-1, -1)));
        assert!(offsets.contains(&(1, 1)));
    }

    #[test]
    fn test_cross_offsets() {
        let offsets = StructuringElement::Cross(1).offsets();
        assert_eq!(offsets.len(), 5);
        assert!(offsets.contains(&(0, 0)));
        assert!(offsets.contains(&(0, -1)));
        assert!(!offsets.contains(&(1, 1)));
    }

    #[test]
    fn test_validate_zero_radius() {
        assert!(StructuringElement::Square(0).validate().is_err());
        assert!(StructuringElement::default().validate().is_ok());
    }
}
