//! Data model shared by the engine, the stores and the plugins

pub mod shortlink;
pub mod status;
pub mod target;

pub use shortlink::{
    RotationGroup, RotationGroupId, RotationHistory, RotationHistoryId, RotationReason, Shortlink,
    ShortlinkId, ShortlinkTarget, ShortlinkTargetId,
};
pub use status::ProbeStatus;
pub use target::{
    CheckResult, CheckResultId, Resolver, ResolverId, ResolverKind, Target, TargetGroup,
    TargetGroupId, TargetId, TargetKind, extract_hostname, with_default_scheme,
};
