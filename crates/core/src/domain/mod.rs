pub mod commerce;
pub mod intent;
pub mod knowledge;
pub mod profile;
