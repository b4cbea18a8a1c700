pub mod dataset;
pub mod job;
pub mod model;
pub mod preview;
pub mod project;

pub use dataset::{DatasetId, DatasetInfo, DatasetPreview};
pub use job::{JobId, JobRecord, JobRequest, JobStatus, MetricSample};
pub use model::{ModelConfig, ModelConfigRequest, ModelId};
pub use project::{Project, ProjectId, ProjectRequest};
