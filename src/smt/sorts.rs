use crate::types::VarKind;

/// SMT sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    Int,
    Real,
}

impl SmtSort {
    pub fn is_numeric(&self) -> bool {
        matches!(self, SmtSort::Int | SmtSort::Real)
    }

    /// Wider of two numeric sorts; `Real` absorbs `Int`.
    pub fn widen(self, other: SmtSort) -> SmtSort {
        if self == SmtSort::Real || other == SmtSort::Real {
            SmtSort::Real
        } else {
            SmtSort::Int
        }
    }
}

impl From<VarKind> for SmtSort {
    fn from(kind: VarKind) -> Self {
        match kind {
            VarKind::Bool => SmtSort::Bool,
            VarKind::Int => SmtSort::Int,
            VarKind::Real => SmtSort::Real,
        }
    }
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
            SmtSort::Real => write!(f, "Real"),
        }
    }
}
