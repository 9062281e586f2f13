//! Rule engine: predicates, rule model, matcher, actions and the processor
//! tying them together.

pub mod actions;
pub mod matcher;
pub mod model;
pub mod predicates;
pub mod processor;

pub use actions::{Action, ActionKind, apply_action};
pub use matcher::{Matcher, RuleMatch};
pub use model::{ActionSpec, Combinator, Condition, Rule, RuleSet};
pub use predicates::{Predicate, get_predicate, parse_duration};
pub use processor::{ProcessReport, RuleOutcome, RuleProcessor, RuleStatus};
