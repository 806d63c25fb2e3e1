use crate::error::DiscoveryError;
use crate::events::{EventBus, LifecycleEvent};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Turns one source location into the values it declares
pub trait SourceLoader {
    type Item;

    fn load(&self, location: &Path) -> Result<Vec<Self::Item>, DiscoveryError>;
}

impl<F, T> SourceLoader for F
where
    F: Fn(&Path) -> Result<Vec<T>, DiscoveryError>,
{
    type Item = T;

    fn load(&self, location: &Path) -> Result<Vec<T>, DiscoveryError> {
        self(location)
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Candidate locations bound to a loader and a capability predicate.
///
/// Nothing is loaded until [`Discovery::iter`] is consumed, and every call
/// to `iter` scans the locations again from the start.
pub struct Discovery<L: SourceLoader> {
    locations: Vec<PathBuf>,
    loader: L,
    predicate: Predicate<L::Item>,
    events: Option<EventBus>,
}

impl<L: SourceLoader> Discovery<L> {
    pub fn new<I, P, F>(locations: I, loader: L, predicate: F) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
        F: Fn(&L::Item) -> bool + Send + Sync + 'static,
    {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
            loader,
            predicate: Box::new(predicate),
            events: None,
        }
    }

    /// Publish skipped locations on `events` instead of only logging them
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn iter(&self) -> DiscoveryIter<'_, L> {
        DiscoveryIter {
            discovery: self,
            next_location: 0,
            pending: VecDeque::new(),
            skipped: 0,
        }
    }

    fn skip(&self, location: &Path, error: &DiscoveryError) {
        match &self.events {
            Some(events) => {
                events.publish(LifecycleEvent::LocationSkipped {
                    location: location.display().to_string(),
                    error: error.to_string(),
                });
            }
            None => {
                warn!(location = %location.display(), error = %error, "Skipping component source");
            }
        }
    }
}

impl<'a, L: SourceLoader> IntoIterator for &'a Discovery<L> {
    type Item = L::Item;
    type IntoIter = DiscoveryIter<'a, L>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`Discovery`]'s locations
pub struct DiscoveryIter<'a, L: SourceLoader> {
    discovery: &'a Discovery<L>,
    next_location: usize,
    pending: VecDeque<L::Item>,
    skipped: usize,
}

impl<L: SourceLoader> DiscoveryIter<'_, L> {
    /// Locations that failed to load so far in this pass
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<L: SourceLoader> Iterator for DiscoveryIter<'_, L> {
    type Item = L::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let discovery = self.discovery;
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }

            let location = discovery.locations.get(self.next_location)?;
            self.next_location += 1;

            match discovery.loader.load(location) {
                Ok(items) => {
                    let before = items.len();
                    self.pending
                        .extend(items.into_iter().filter(|item| (discovery.predicate)(item)));
                    debug!(
                        "Loaded {} value(s) from {}, {} matched",
                        before,
                        location.display(),
                        self.pending.len()
                    );
                }
                Err(e) => {
                    self.skipped += 1;
                    discovery.skip(location, &e);
                }
            }
        }
    }
}

/// Load every location and return the values accepted by `predicate`.
///
/// Locations that fail to load are logged and skipped.
pub fn discover<I, P, L, F>(locations: I, loader: L, predicate: F) -> Vec<L::Item>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
    L: SourceLoader,
    F: Fn(&L::Item) -> bool + Send + Sync + 'static,
{
    Discovery::new(locations, loader, predicate).iter().collect()
}
