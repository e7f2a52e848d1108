//! Plugin registries and best-match resolution.
//!
//! A [`PluginRegistry`] holds entries of one plugin kind in registration
//! order. Lookups filter entries by type compatibility, then by media type in
//! the caller's preference order, and pick the most specific survivor. Earlier
//! registrations win ties.
//!
//! Registries are mutable while the router is being built and become
//! read-only once it starts serving.

use std::fmt;

use restbind_core::plugin::{
    ContextProvider, ExceptionHandler, HandlerEntry, PluginEntry, ProviderEntry, ReaderEntry,
    ResponseWriter, ValueReader, WriterEntry,
};
use restbind_core::{MediaType, RestError, RestResult, TypeDescriptor};
use tracing::debug;

use crate::reader::{JsonBodyReader, TextBodyReader};
use crate::writer::{GenericResponseWriter, JsonResponseWriter};

/// Lifecycle of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryState {
    /// Entries may be added or cleared.
    #[default]
    Building,
    /// Read-only.
    Serving,
}

/// Which way the declared type of an entry must relate to the queried type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The queried value is handed to the plugin: it must be assignable to the
    /// entry's target. Writers and exception handlers.
    Consumes,
    /// The plugin produces the queried type: its target must be assignable to
    /// the query. Readers and context providers. Entries targeting
    /// [`Anything`](restbind_core::Anything) match every query and rank last.
    Produces,
}

impl Direction {
    fn rank(self, query: &TypeDescriptor, target: &TypeDescriptor) -> Option<usize> {
        match self {
            Self::Consumes => query.distance_to(target),
            Self::Produces if target.is_anything() => Some(usize::MAX),
            Self::Produces => target.distance_to(query),
        }
    }
}

/// Result of a lookup.
pub struct Resolved<P: ?Sized> {
    /// The chosen entry.
    pub entry: PluginEntry<P>,
    /// Type distance, or `None` when the entry was chosen by media type alone
    /// and still needs a hard compatibility check.
    pub distance: Option<usize>,
}

impl<P: ?Sized> Resolved<P> {
    /// Whether the entry was chosen without a type match.
    #[must_use]
    pub const fn is_unchecked(&self) -> bool {
        self.distance.is_none()
    }
}

impl<P: ?Sized> fmt::Debug for Resolved<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("entry", &self.entry)
            .field("distance", &self.distance)
            .finish()
    }
}

/// Registered entries of one plugin kind.
pub struct PluginRegistry<P: ?Sized> {
    kind: &'static str,
    direction: Direction,
    entries: Vec<PluginEntry<P>>,
    state: RegistryState,
}

impl<P: ?Sized> PluginRegistry<P> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new(kind: &'static str, direction: Direction) -> Self {
        Self {
            kind,
            direction,
            entries: Vec::new(),
            state: RegistryState::Building,
        }
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// Fails with [`RestError::IllegalArgument`] once the registry is serving.
    pub fn register(&mut self, entry: PluginEntry<P>) -> RestResult<()> {
        self.ensure_building("register")?;
        debug!(kind = self.kind, plugin = entry.name(), target = %entry.target(), "plugin registered");
        self.entries.push(entry);
        Ok(())
    }

    /// Removes every entry.
    pub fn clear(&mut self) -> RestResult<()> {
        self.ensure_building("clear")?;
        self.entries.clear();
        Ok(())
    }

    /// Makes the registry read-only.
    pub fn freeze(&mut self) {
        self.state = RegistryState::Serving;
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RegistryState {
        self.state
    }

    /// Entries in registration order.
    #[must_use]
    pub fn entries(&self) -> &[PluginEntry<P>] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best entry for `query` among those serving one of `media`.
    ///
    /// An empty `media` slice skips media filtering.
    #[must_use]
    pub fn resolve(&self, query: &TypeDescriptor, media: &[MediaType]) -> Option<Resolved<P>> {
        best_match(self.direction, &self.entries, query, media)
    }

    /// First entry serving one of `media`, regardless of type.
    ///
    /// The caller is expected to run the hard compatibility check.
    #[must_use]
    pub fn resolve_by_media(&self, media: &[MediaType]) -> Option<Resolved<P>> {
        self.entries
            .iter()
            .filter(|entry| entry.media().is_some())
            .filter_map(|entry| entry.accepts_media(media).map(|position| (position, entry)))
            .min_by_key(|(position, _)| *position)
            .map(|(_, entry)| Resolved {
                entry: entry.clone(),
                distance: None,
            })
    }

    fn ensure_building(&self, action: &str) -> RestResult<()> {
        match self.state {
            RegistryState::Building => Ok(()),
            RegistryState::Serving => Err(RestError::illegal_argument(format!(
                "cannot {action} {} while serving",
                self.kind
            ))),
        }
    }
}

impl<P: ?Sized> fmt::Debug for PluginRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("kind", &self.kind)
            .field("entries", &self.entries)
            .field("state", &self.state)
            .finish()
    }
}

/// Picks the most specific entry for `query`, walking `media` in preference
/// order. Used for registries and for per-route override lists alike.
pub fn best_match<P: ?Sized>(
    direction: Direction,
    entries: &[PluginEntry<P>],
    query: &TypeDescriptor,
    media: &[MediaType],
) -> Option<Resolved<P>> {
    let typed: Vec<(usize, &PluginEntry<P>)> = entries
        .iter()
        .filter_map(|entry| direction.rank(query, entry.target()).map(|distance| (distance, entry)))
        .collect();

    if media.is_empty() {
        return most_specific(typed.iter());
    }
    for (level, wanted) in media.iter().enumerate() {
        let single = std::slice::from_ref(wanted);
        let found = most_specific(
            typed
                .iter()
                .filter(|(_, entry)| entry.media().is_some() && entry.accepts_media(single).is_some()),
        );
        if found.is_some() {
            return found;
        }
        // Entries without a media type serve everything, after every concrete match.
        if level + 1 == media.len() {
            return most_specific(typed.iter().filter(|(_, entry)| entry.media().is_none()));
        }
    }
    None
}

fn most_specific<'a, 'b: 'a, P: ?Sized + 'b>(
    candidates: impl Iterator<Item = &'a (usize, &'b PluginEntry<P>)>,
) -> Option<Resolved<P>> {
    candidates
        .min_by_key(|(distance, _)| *distance)
        .map(|(distance, entry)| Resolved {
            entry: (*entry).clone(),
            distance: Some(*distance),
        })
}

/// All plugin registries of one router.
#[derive(Debug)]
pub struct Registry {
    readers: PluginRegistry<dyn ValueReader>,
    writers: PluginRegistry<dyn ResponseWriter>,
    exception_handlers: PluginRegistry<dyn ExceptionHandler>,
    providers: PluginRegistry<dyn ContextProvider>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Empty registries.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            readers: PluginRegistry::new("reader", Direction::Produces),
            writers: PluginRegistry::new("writer", Direction::Consumes),
            exception_handlers: PluginRegistry::new("exception handler", Direction::Consumes),
            providers: PluginRegistry::new("context provider", Direction::Produces),
        }
    }

    /// Registries preloaded with the JSON and plain-text codecs.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install_defaults();
        registry
    }

    fn install_defaults(&mut self) {
        self.readers.entries.push(JsonBodyReader::entry());
        self.readers.entries.push(TextBodyReader::entry());
        self.writers.entries.push(JsonResponseWriter::entry());
        self.writers.entries.push(GenericResponseWriter::text_entry());
    }

    /// Registers a body reader.
    pub fn add_reader(&mut self, entry: ReaderEntry) -> RestResult<()> {
        self.readers.register(entry)
    }

    /// Registers a response writer.
    pub fn add_writer(&mut self, entry: WriterEntry) -> RestResult<()> {
        self.writers.register(entry)
    }

    /// Registers an exception handler.
    pub fn add_exception_handler(&mut self, entry: HandlerEntry) -> RestResult<()> {
        self.exception_handlers.register(entry)
    }

    /// Registers a context provider.
    pub fn add_provider(&mut self, entry: ProviderEntry) -> RestResult<()> {
        self.providers.register(entry)
    }

    /// Readers.
    #[must_use]
    pub const fn readers(&self) -> &PluginRegistry<dyn ValueReader> {
        &self.readers
    }

    /// Writers.
    #[must_use]
    pub const fn writers(&self) -> &PluginRegistry<dyn ResponseWriter> {
        &self.writers
    }

    /// Exception handlers.
    #[must_use]
    pub const fn exception_handlers(&self) -> &PluginRegistry<dyn ExceptionHandler> {
        &self.exception_handlers
    }

    /// Context providers.
    #[must_use]
    pub const fn providers(&self) -> &PluginRegistry<dyn ContextProvider> {
        &self.providers
    }

    /// Reader for a body of type `wanted` arriving as one of `media`.
    ///
    /// Falls back to a media-only match, flagged unchecked.
    #[must_use]
    pub fn reader_for(&self, wanted: &TypeDescriptor, media: &[MediaType]) -> Option<Resolved<dyn ValueReader>> {
        self.readers
            .resolve(wanted, media)
            .or_else(|| self.readers.resolve_by_media(media))
    }

    /// Writer for a result of type `result` acceptable as one of `media`.
    #[must_use]
    pub fn writer_for(&self, result: &TypeDescriptor, media: &[MediaType]) -> Option<Resolved<dyn ResponseWriter>> {
        self.writers.resolve(result, media)
    }

    /// Exception handler for a failure of type `cause`.
    #[must_use]
    pub fn exception_handler_for(&self, cause: &TypeDescriptor) -> Option<Resolved<dyn ExceptionHandler>> {
        self.exception_handlers.resolve(cause, &[])
    }

    /// Provider of values of type `wanted`.
    #[must_use]
    pub fn provider_for(&self, wanted: &TypeDescriptor) -> Option<Resolved<dyn ContextProvider>> {
        self.providers.resolve(wanted, &[])
    }

    /// Removes all readers, writers, exception handlers and providers.
    pub fn clear(&mut self) -> RestResult<()> {
        self.readers.clear()?;
        self.writers.clear()?;
        self.exception_handlers.clear()?;
        self.providers.clear()
    }

    /// Makes every registry read-only.
    pub fn freeze(&mut self) {
        self.readers.freeze();
        self.writers.freeze();
        self.exception_handlers.freeze();
        self.providers.freeze();
    }

    /// Lifecycle state (all registries share it).
    #[must_use]
    pub const fn state(&self) -> RegistryState {
        self.readers.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restbind_core::plugin::ExceptionHandler;
    use proptest::prelude::*;
    use restbind_core::{typed, Anything, Cause, HttpRequest, HttpResponse, Payload};
    use std::sync::Arc;

    struct Animal;
    struct Dog;
    typed!(Animal);
    typed!(Dog: Animal);

    struct Named(&'static str);

    impl ResponseWriter for Named {
        fn write(&self, _: Option<&Payload>, _: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
            response.end_with(self.0)
        }
    }

    impl ExceptionHandler for Named {
        fn write(&self, _: &Cause, _: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
            response.end_with(self.0)
        }
    }

    fn name_of(resolved: &Resolved<dyn ResponseWriter>) -> String {
        let mut response = HttpResponse::new();
        let request = HttpRequest::build(http::Method::GET, "/").unwrap();
        resolved
            .entry
            .get(&restbind_core::Container::new())
            .unwrap()
            .write(None, &request, &mut response)
            .unwrap();
        String::from_utf8(response.body().to_vec()).unwrap()
    }

    #[test]
    fn test_most_specific_type_wins() {
        let mut writers = PluginRegistry::<dyn ResponseWriter>::new("writer", Direction::Consumes);
        writers.register(WriterEntry::of::<Anything, _>(Named("any"))).unwrap();
        writers.register(WriterEntry::of::<Animal, _>(Named("animal"))).unwrap();
        writers.register(WriterEntry::of::<Dog, _>(Named("dog"))).unwrap();

        let dog = writers.resolve(&TypeDescriptor::of::<Dog>(), &[]).unwrap();
        assert_eq!(name_of(&dog), "dog");
        assert_eq!(dog.distance, Some(0));

        let animal = writers.resolve(&TypeDescriptor::of::<Animal>(), &[]).unwrap();
        assert_eq!(name_of(&animal), "animal");

        let other = writers.resolve(&TypeDescriptor::of::<String>(), &[]).unwrap();
        assert_eq!(name_of(&other), "any");
    }

    #[test]
    fn test_ties_go_to_first_registration() {
        let mut writers = PluginRegistry::<dyn ResponseWriter>::new("writer", Direction::Consumes);
        writers.register(WriterEntry::of::<Dog, _>(Named("first"))).unwrap();
        writers.register(WriterEntry::of::<Dog, _>(Named("second"))).unwrap();
        let resolved = writers.resolve(&TypeDescriptor::of::<Dog>(), &[]).unwrap();
        assert_eq!(name_of(&resolved), "first");
    }

    #[test]
    fn test_media_preference_order() {
        let mut writers = PluginRegistry::<dyn ResponseWriter>::new("writer", Direction::Consumes);
        writers
            .register(WriterEntry::of::<Anything, _>(Named("json")).with_media(MediaType::json()))
            .unwrap();
        writers
            .register(WriterEntry::of::<Dog, _>(Named("text")).with_media(MediaType::text()))
            .unwrap();

        let query = TypeDescriptor::of::<Dog>();
        let json_first = writers.resolve(&query, &[MediaType::json(), MediaType::text()]).unwrap();
        assert_eq!(name_of(&json_first), "json");
        let text_first = writers.resolve(&query, &[MediaType::text(), MediaType::json()]).unwrap();
        assert_eq!(name_of(&text_first), "text");
        assert!(writers.resolve(&query, &[MediaType::html()]).is_none());
    }

    #[test]
    fn test_bare_wildcard_only_selects_media_agnostic_entries() {
        let mut writers = PluginRegistry::<dyn ResponseWriter>::new("writer", Direction::Consumes);
        writers
            .register(WriterEntry::of::<Anything, _>(Named("json")).with_media(MediaType::json()))
            .unwrap();
        assert!(writers
            .resolve(&TypeDescriptor::of::<Dog>(), &[MediaType::wildcard()])
            .is_none());

        writers.register(WriterEntry::of::<Anything, _>(Named("plain"))).unwrap();
        let resolved = writers
            .resolve(&TypeDescriptor::of::<Dog>(), &[MediaType::wildcard()])
            .unwrap();
        assert_eq!(name_of(&resolved), "plain");
    }

    #[test]
    fn test_media_fallback_is_unchecked() {
        let registry = {
            let mut registry = Registry::new();
            registry.add_reader(TextBodyReader::entry().with_target(TypeDescriptor::of::<Dog>())).unwrap();
            registry
        };
        let resolved = registry
            .reader_for(&TypeDescriptor::of::<String>(), &[MediaType::text()])
            .unwrap();
        assert!(resolved.is_unchecked());
        assert!(registry.reader_for(&TypeDescriptor::of::<String>(), &[MediaType::json()]).is_none());
    }

    #[test]
    fn test_failure_handlers_rank_by_hierarchy() {
        let mut handlers = PluginRegistry::<dyn ExceptionHandler>::new("exception handler", Direction::Consumes);
        handlers
            .register(HandlerEntry::from_instance(
                TypeDescriptor::any_failure(),
                "any",
                Arc::new(Named("any")) as Arc<dyn ExceptionHandler>,
            ))
            .unwrap();
        handlers
            .register(HandlerEntry::from_instance(
                RestError::illegal_argument("").descriptor(),
                "illegal",
                Arc::new(Named("illegal")) as Arc<dyn ExceptionHandler>,
            ))
            .unwrap();

        let illegal = handlers
            .resolve(&RestError::illegal_argument("x").descriptor(), &[])
            .unwrap();
        assert_eq!(illegal.entry.name(), "illegal");
        let other = handlers.resolve(&RestError::Unauthorized.descriptor(), &[]).unwrap();
        assert_eq!(other.entry.name(), "any");
    }

    #[test]
    fn test_frozen_registry_rejects_changes() {
        let mut registry = Registry::with_defaults();
        assert_eq!(registry.readers().len(), 2);
        registry.freeze();
        assert_eq!(registry.state(), RegistryState::Serving);
        let err = registry.add_writer(JsonResponseWriter::entry()).unwrap_err();
        assert!(matches!(err, RestError::IllegalArgument(_)));
        assert!(registry.clear().is_err());
    }

    fn media_choice(choice: u8) -> Option<MediaType> {
        match choice % 3 {
            0 => None,
            1 => Some(MediaType::json()),
            _ => Some(MediaType::text()),
        }
    }

    proptest! {
        #[test]
        fn prop_incompatible_entries_are_never_resolved(
            entries in proptest::collection::vec((any::<bool>(), 0u8..3), 0..8),
            wanted in proptest::collection::vec(0u8..3, 0..3),
        ) {
            let mut writers = PluginRegistry::<dyn ResponseWriter>::new("writer", Direction::Consumes);
            for (dog, media) in &entries {
                let entry = if *dog {
                    WriterEntry::of::<Dog, _>(Named("dog"))
                } else {
                    WriterEntry::of::<Animal, _>(Named("animal"))
                };
                let entry = match media_choice(*media) {
                    Some(media) => entry.with_media(media),
                    None => entry,
                };
                writers.register(entry).unwrap();
            }
            let media: Vec<MediaType> = wanted
                .iter()
                .map(|choice| media_choice(*choice).unwrap_or_else(MediaType::wildcard))
                .collect();

            prop_assert!(writers.resolve(&TypeDescriptor::of::<String>(), &media).is_none());

            // an animal is not necessarily a dog
            let query = TypeDescriptor::of::<Animal>();
            if let Some(resolved) = writers.resolve(&query, &media) {
                prop_assert_eq!(name_of(&resolved), "animal");
                prop_assert!(query.is_assignable_to(resolved.entry.target()));
            }
        }
    }
}
