use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cycle detected in tasks of project {project}: {}", path.join(" -> "))]
    TaskCycle { project: String, path: Vec<String> },

    #[error("Cycle detected in project dependencies: {0}")]
    ProjectCycle(String),

    #[error("Project {project} depends on unknown project {dependency}")]
    UnknownProject { project: String, dependency: String },

    #[error("No project defines task {0}")]
    UnknownTarget(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Task error: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;
