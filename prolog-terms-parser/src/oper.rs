//! Operator definitions and precedence handling.
//!
//! Prolog operators are declared with one of seven types combining fixity
//! and associativity (`fx fy xf yf xfx xfy yfx`) and a precedence between
//! 0 and 1200. One name may carry up to three simultaneous definitions —
//! one per fixity — stored in an [`OpTriplet`] that rides as the trie
//! terminal's payload. `op/3` directives mutate triplets while parsing is
//! in progress.

use smartstring::alias::String;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Structural position of an operator relative to its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Fixity {
    Prefix = 0,
    Infix = 1,
    Postfix = 2,
}

impl Fixity {
    /// The total number of fixity variants.
    pub const COUNT: usize = 3;

    /// String representations of each variant, in declaration order.
    pub const STRS: &[&str] = &["prefix", "infix", "postfix"];
}

impl From<Fixity> for usize {
    fn from(f: Fixity) -> Self {
        f as usize
    }
}

impl fmt::Display for Fixity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::STRS[usize::from(*self)])
    }
}

/// The seven Prolog operator types.
///
/// The `x`/`y` letters encode the argument-precedence rule applied during
/// precedence climbing: an `x` argument must bind strictly tighter than
/// the operator, a `y` argument may bind equally tight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpType {
    FX = 0,
    FY = 1,
    XF = 2,
    YF = 3,
    XFX = 4,
    XFY = 5,
    YFX = 6,
}

impl OpType {
    pub const COUNT: usize = 7;
    pub const STRS: &[&str] = &["fx", "fy", "xf", "yf", "xfx", "xfy", "yfx"];

    pub fn fixity(self) -> Fixity {
        match self {
            OpType::FX | OpType::FY => Fixity::Prefix,
            OpType::XF | OpType::YF => Fixity::Postfix,
            OpType::XFX | OpType::XFY | OpType::YFX => Fixity::Infix,
        }
    }
}

impl From<OpType> for usize {
    fn from(t: OpType) -> Self {
        t as usize
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::STRS[usize::from(*self)])
    }
}

/// Error type returned when parsing an [`OpType`] from a string fails.
#[derive(Debug, Clone)]
pub struct ParseOpTypeError(String);

impl fmt::Display for ParseOpTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid operator type: {}", self.0)
    }
}

impl std::error::Error for ParseOpTypeError {}

impl FromStr for OpType {
    type Err = ParseOpTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fx" => Ok(OpType::FX),
            "fy" => Ok(OpType::FY),
            "xf" => Ok(OpType::XF),
            "yf" => Ok(OpType::YF),
            "xfx" => Ok(OpType::XFX),
            "xfy" => Ok(OpType::XFY),
            "yfx" => Ok(OpType::YFX),
            other => Err(ParseOpTypeError(String::from(other))),
        }
    }
}

impl TryFrom<&str> for OpType {
    type Error = ParseOpTypeError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Bounds of the operator precedence scale.
pub const MIN_OPER_PREC: usize = 0;
pub const MAX_OPER_PREC: usize = 1200;

/// One operator definition: precedence, type, and whether it came from a
/// user `op/3` directive (reserved definitions cannot be removed).
#[derive(Debug, Clone, Copy)]
pub struct OpDef {
    pub prec: usize,
    pub op_type: OpType,
    pub user_defined: bool,
}

impl OpDef {
    /// Highest precedence the left operand may have.
    pub fn left_max(&self) -> usize {
        match self.op_type {
            OpType::YFX | OpType::YF => self.prec,
            OpType::XFX | OpType::XFY | OpType::XF => self.prec.saturating_sub(1),
            OpType::FX | OpType::FY => 0,
        }
    }

    /// Highest precedence the right operand may have.
    pub fn right_max(&self) -> usize {
        match self.op_type {
            OpType::XFY | OpType::FY => self.prec,
            OpType::XFX | OpType::YFX | OpType::FX => self.prec.saturating_sub(1),
            OpType::XF | OpType::YF => 0,
        }
    }
}

/// The up-to-three simultaneous definitions attached to one operator
/// name, indexed by [`Fixity`].
#[derive(Debug, Clone, Default)]
pub struct OpTriplet {
    tab: [Option<OpDef>; Fixity::COUNT],
}

impl OpTriplet {
    pub const fn new() -> Self {
        Self {
            tab: [const { None }; Fixity::COUNT],
        }
    }

    pub fn get(&self, f: Fixity) -> Option<&OpDef> {
        self.tab[usize::from(f)].as_ref()
    }

    /// Overwrite the slot selected by the definition's own fixity.
    pub fn set(&mut self, def: OpDef) {
        self.tab[usize::from(def.op_type.fixity())] = Some(def);
    }

    pub fn clear(&mut self, f: Fixity) -> Option<OpDef> {
        self.tab[usize::from(f)].take()
    }

    pub fn is_empty(&self) -> bool {
        self.tab.iter().all(|x| x.is_none())
    }

    pub fn prefix(&self) -> Option<&OpDef> {
        self.get(Fixity::Prefix)
    }

    pub fn infix(&self) -> Option<&OpDef> {
        self.get(Fixity::Infix)
    }

    pub fn postfix(&self) -> Option<&OpDef> {
        self.get(Fixity::Postfix)
    }

    /// Highest precedence among the defined slots; the binding strength
    /// of the operator name used as a plain operand.
    pub fn max_prec(&self) -> usize {
        self.tab
            .iter()
            .flatten()
            .map(|d| d.prec)
            .max()
            .unwrap_or(0)
    }
}

impl std::ops::Index<Fixity> for OpTriplet {
    type Output = Option<OpDef>;

    fn index(&self, i: Fixity) -> &Self::Output {
        &self.tab[usize::from(i)]
    }
}

impl std::ops::IndexMut<Fixity> for OpTriplet {
    fn index_mut(&mut self, i: Fixity) -> &mut Self::Output {
        &mut self.tab[usize::from(i)]
    }
}

/// Illegal mutations of the operator and bracket tables, and grammar
/// constraints checked while building pseudo-terms.
#[derive(Debug, Clone, Error)]
pub enum GrammarError {
    #[error("operator precedence {prec} out of range {MIN_OPER_PREC}..={MAX_OPER_PREC} for {name:?}")]
    PrecedenceOutOfRange { prec: usize, name: String },

    #[error("invalid operator type {0:?}")]
    InvalidOpType(String),

    #[error("removing reserved operator {name:?} is not allowed")]
    RemoveReserved { name: String },

    #[error("no {op_type} definition for operator {name:?}")]
    NoSuchOperator { op_type: OpType, name: String },

    #[error("bracket images must differ, got {0:?} twice")]
    BracketImagesEqual(String),

    #[error("duplicate exception class {0:?} in try statement")]
    DuplicateCatchClass(String),

    #[error("a catch clause without an exception class must be the last clause")]
    MisplacedDefaultCatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_type_round_trips_names() {
        for (i, s) in OpType::STRS.iter().enumerate() {
            let t: OpType = s.parse().unwrap();
            assert_eq!(usize::from(t), i);
            assert_eq!(t.to_string(), *s);
        }
        assert!("zfz".parse::<OpType>().is_err());
    }

    #[test]
    fn argument_precedence_rules() {
        let xfx = OpDef { prec: 700, op_type: OpType::XFX, user_defined: false };
        assert_eq!((xfx.left_max(), xfx.right_max()), (699, 699));
        let xfy = OpDef { prec: 1000, op_type: OpType::XFY, user_defined: false };
        assert_eq!((xfy.left_max(), xfy.right_max()), (999, 1000));
        let yfx = OpDef { prec: 500, op_type: OpType::YFX, user_defined: false };
        assert_eq!((yfx.left_max(), yfx.right_max()), (500, 499));
        let fy = OpDef { prec: 200, op_type: OpType::FY, user_defined: false };
        assert_eq!((fy.left_max(), fy.right_max()), (0, 200));
        let xf = OpDef { prec: 300, op_type: OpType::XF, user_defined: false };
        assert_eq!((xf.left_max(), xf.right_max()), (299, 0));
    }

    #[test]
    fn triplet_slots_are_independent() {
        let mut t = OpTriplet::new();
        assert!(t.is_empty());
        t.set(OpDef { prec: 500, op_type: OpType::YFX, user_defined: false });
        t.set(OpDef { prec: 200, op_type: OpType::FY, user_defined: true });
        assert_eq!(t.infix().unwrap().prec, 500);
        assert_eq!(t.prefix().unwrap().prec, 200);
        assert!(t.postfix().is_none());
        assert_eq!(t.max_prec(), 500);
        // Overwriting the infix slot leaves the prefix slot alone.
        t.set(OpDef { prec: 400, op_type: OpType::XFX, user_defined: true });
        assert_eq!(t.infix().unwrap().prec, 400);
        assert_eq!(t.prefix().unwrap().prec, 200);
        t.clear(Fixity::Infix);
        t.clear(Fixity::Prefix);
        assert!(t.is_empty());
    }
}
