//! Allow-list of testing agents permitted to poll for jobs.

use std::collections::BTreeSet;

use crate::error::CoreError;

/// Agents recognised when no list is configured.
pub const DEFAULT_AGENTS: [&str; 3] = ["TXRIWin", "RIWSMac", "PoolMac"];

#[derive(Debug, Clone)]
pub struct AgentRoster {
    names: BTreeSet<String>,
}

impl AgentRoster {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.is_empty())
                .collect(),
        }
    }

    /// Names are matched exactly; there is no case folding.
    pub fn is_authorized(&self, agent: &str) -> bool {
        self.names.contains(agent)
    }

    pub fn authorize(&self, agent: &str) -> Result<(), CoreError> {
        if self.is_authorized(agent) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized {
                agent: agent.to_string(),
            })
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::new(DEFAULT_AGENTS)
    }
}
