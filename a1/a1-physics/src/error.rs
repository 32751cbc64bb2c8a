use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhysicsError {
    #[error("failed to read scene description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed URDF: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("URDF has no <robot> element")]
    NotARobot,
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("invalid value `{value}` for {what}")]
    InvalidValue { what: String, value: String },
    #[error("joint `{joint}` references unknown link `{link}`")]
    UnknownLink { joint: String, link: String },
    #[error("link `{link}` is the child of both `{first}` and `{second}`")]
    MultipleParents {
        link: String,
        first: String,
        second: String,
    },
    #[error("no root link found (every link is a joint child)")]
    MissingRoot,
    #[error("{what} has length {got}, expected {expected}")]
    StateDimension {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}
