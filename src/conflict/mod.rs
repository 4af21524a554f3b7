//! 冲突检测与解决

pub mod detector;
pub mod resolver;
pub mod types;

pub use detector::{ConflictDetector, ConflictRule, QualityGapRule, ResourceClaimRule};
pub use resolver::{ConflictResolver, ResolutionContext, ResolutionStrategy};
pub use types::{
    Conflict, ConflictResolution, ConflictStatus, ConflictType, ResolutionAction, Severity,
};
