mod envelope;
mod invoice;

pub use envelope::*;
pub use invoice::*;
