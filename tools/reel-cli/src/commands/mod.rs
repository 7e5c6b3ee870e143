pub mod check;
pub mod concat;
pub mod metadata;
pub mod mux;
pub mod probe;
pub mod record;
pub mod run;
