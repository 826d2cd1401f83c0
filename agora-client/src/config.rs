use std::num::NonZeroUsize;

use anyhow::Context;

pub const POSTS_PER_PAGE_VAR: &str = "AGORA_POSTS_PER_PAGE";
pub const RECOUNT_ON_REMOVE_VAR: &str = "AGORA_RECOUNT_ON_REMOVE";

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Page size used when a page request does not name one
    pub posts_per_page: NonZeroUsize,

    /// Whether removing a post from a thread also recounts the thread's posts
    pub recount_on_remove: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            posts_per_page: NonZeroUsize::new(20).expect("20 is not zero"),
            recount_on_remove: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> anyhow::Result<Config> {
        serde_json::from_str(json).context("parsing configuration")
    }

    pub fn from_env() -> anyhow::Result<Config> {
        Config::default().with_vars(std::env::vars())
    }

    /// Overrides the fields for which a variable is set
    pub fn with_vars(
        mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> anyhow::Result<Config> {
        for (name, value) in vars {
            match &name as &str {
                POSTS_PER_PAGE_VAR => {
                    self.posts_per_page = value
                        .parse()
                        .with_context(|| format!("parsing {name}={value:?}"))?;
                }
                RECOUNT_ON_REMOVE_VAR => {
                    self.recount_on_remove = value
                        .parse()
                        .with_context(|| format!("parsing {name}={value:?}"))?;
                }
                _ => (),
            }
        }
        Ok(self)
    }
}
