pub mod completion;
pub mod convert;
pub mod inspect;
