pub mod confirmation;

pub use confirmation::confirmation_state;
