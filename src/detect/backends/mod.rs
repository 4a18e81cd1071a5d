pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{BrightRegionCascade, BrightRegionInference};

#[cfg(feature = "backend-tract")]
pub use tract::{TractFaceCascade, TractObjectInference};
