//! State variables: `ReadValue` reads them, `Assign` writes them.
//!
//! Both are evaluated by the plan against its `SessionState`.
mod assign;
mod read_value;

pub use self::assign::Assign;
pub use self::read_value::ReadValue;
