//! Generic growable containers with stable integer indices.
//!
//! Index structures hand out `u32` ids that must stay valid for the life
//! of the index, so these containers never remove or reorder entries.
//! Both flavors persist through the structured storage layer at a fixed
//! record stride, and both have a headerless append form for logs that
//! are rebuilt after a crash.

pub mod growable;
pub mod keyed;
pub mod record;

pub use growable::GrowableVec;
pub use keyed::KeyedVec;
pub use record::FixedRecord;
