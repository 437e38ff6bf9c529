use crate::errors::RunError;
use crate::link::Link;

/// Repeat ceiling for chains that do not set one.
pub const DEFAULT_REPEAT_LIMIT: u32 = 1000;

/// An ordered sequence of links executed as one unit.
#[derive(Debug)]
pub struct Chain {
    name: String,
    links: Vec<Box<dyn Link>>,
    /// Number of parallel workers; 1 runs the chain inline
    fork: usize,
    /// Overrides the run-wide repeat ceiling when set
    repeat_limit: Option<u32>,
    pub(crate) enabled: bool,
    pub(crate) prev_chain_name: Option<String>,
}

impl Chain {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            links: Vec::new(),
            fork: 1,
            repeat_limit: None,
            enabled: true,
            prev_chain_name: None,
        }
    }

    /// Run the chain in `width` parallel workers (values below 1 mean 1).
    pub fn with_fork(mut self, width: usize) -> Self {
        self.fork = width.max(1);
        self
    }

    pub fn with_repeat_limit(mut self, limit: u32) -> Self {
        self.repeat_limit = Some(limit);
        self
    }

    /// Append a link, builder style.
    pub fn with_link(mut self, link: impl Link + 'static) -> Result<Self, RunError> {
        self.add(link)?;
        Ok(self)
    }

    /// Append a link. Link names are unique within a chain.
    pub fn add(&mut self, link: impl Link + 'static) -> Result<(), RunError> {
        self.add_boxed(Box::new(link))
    }

    pub fn add_boxed(&mut self, link: Box<dyn Link>) -> Result<(), RunError> {
        if self.links.iter().any(|l| l.name() == link.name()) {
            return Err(RunError::DuplicateLink {
                chain: self.name.clone(),
                link: link.name().to_string(),
            });
        }
        tracing::debug!(chain = %self.name, link = %link.name(), "registered link");
        self.links.push(link);
        Ok(())
    }

    /// Remove and return the link named `name`.
    pub fn discard(&mut self, name: &str) -> Option<Box<dyn Link>> {
        let idx = self.links.iter().position(|l| l.name() == name)?;
        Some(self.links.remove(idx))
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fork(&self) -> usize {
        self.fork
    }

    pub fn is_forked(&self) -> bool {
        self.fork > 1
    }

    pub fn repeat_limit(&self) -> Option<u32> {
        self.repeat_limit
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn prev_chain_name(&self) -> Option<&str> {
        self.prev_chain_name.as_deref()
    }

    pub fn links(&self) -> &[Box<dyn Link>] {
        &self.links
    }

    pub(crate) fn links_mut(&mut self) -> &mut [Box<dyn Link>] {
        &mut self.links
    }

    pub fn link_names(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
