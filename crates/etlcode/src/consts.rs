//! Wire constants shared with the cluster.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Chunk size used when a streaming job does not choose one.
pub const DEFAULT_CHUNK_SIZE: usize = 32768;

/// Cluster action tags. A rendered script always travels with [`Action::Start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "copy-bck")]
    CopyBucket,
    #[serde(rename = "create-bck")]
    CreateBucket,
    #[serde(rename = "destroy-bck")]
    DestroyBucket,
    #[serde(rename = "evict-remote-bck")]
    EvictRemoteBucket,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "move-bck")]
    MoveBucket,
    #[serde(rename = "etl-bck")]
    EtlBucket,
    #[serde(rename = "start")]
    Start,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::CopyBucket,
        Action::CreateBucket,
        Action::DestroyBucket,
        Action::EvictRemoteBucket,
        Action::List,
        Action::MoveBucket,
        Action::EtlBucket,
        Action::Start,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::CopyBucket => "copy-bck",
            Action::CreateBucket => "create-bck",
            Action::DestroyBucket => "destroy-bck",
            Action::EvictRemoteBucket => "evict-remote-bck",
            Action::List => "list",
            Action::MoveBucket => "move-bck",
            Action::EtlBucket => "etl-bck",
            Action::Start => "start",
        }
    }

    pub fn from_name(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the cluster hands objects to the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Communication {
    /// The target pushes the object body in the request.
    #[default]
    #[serde(rename = "hpush")]
    HttpPush,
    /// The target redirects the client to the sandbox.
    #[serde(rename = "hpull")]
    HttpPull,
    /// One object on stdin, result on stdout.
    #[serde(rename = "io")]
    Io,
}

impl Communication {
    pub fn name(self) -> &'static str {
        match self {
            Communication::HttpPush => "hpush",
            Communication::HttpPull => "hpull",
            Communication::Io => "io",
        }
    }
}

impl fmt::Display for Communication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the sandbox receives as the request argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArgType {
    /// The object bytes.
    #[default]
    #[serde(rename = "")]
    Bytes,
    /// A URL the sandbox fetches the object from.
    #[serde(rename = "url")]
    Url,
    /// A fully qualified local path to the object.
    #[serde(rename = "fqn")]
    Fqn,
}

impl ArgType {
    pub fn name(self) -> &'static str {
        match self {
            ArgType::Bytes => "",
            ArgType::Url => "url",
            ArgType::Fqn => "fqn",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
