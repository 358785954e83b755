//! The graphics configuration attached to a drawable.
//!
//! A [`GraphicsConfiguration`] starts out holding only the desired
//! [`Capabilities`] and a chooser. At some point before rendering it gets
//! resolved against the platform, and from then on it permanently reports
//! the capabilities that were actually granted. Resolution happens at one
//! of two moments, depending on the windowing path:
//!
//! - *early*, while picking the native visual a window will be created
//!   with (the X11 order of business), or
//! - *late*, against the device context of a window that already exists
//!   (the Win32 order of business).
//!
//! Either way a configuration resolves at most once. Resolving again just
//! hands back the recorded outcome, since the native pixel format of a
//! drawable can't be changed once set.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::caps::Capabilities;
use crate::chooser::{CapabilitiesChooser, DefaultChooser};
use crate::error::{ErrorKind, Result};
use crate::registry::FormatCache;

/// The path a configuration was resolved through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    /// The modern path: fbconfigs on X11, the pixel format extension on
    /// Windows.
    Extension,
    /// The pre-extension descriptor path.
    LegacyDescriptor,
}

/// The recorded outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub(crate) caps: Capabilities,
    pub(crate) native_id: i64,
    pub(crate) method: ResolutionMethod,
}

impl Resolved {
    /// The capabilities the platform actually granted.
    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// The platform's identifier for the chosen format: an X11 fbconfig ID
    /// or a Win32 pixel format index.
    #[inline]
    pub fn native_id(&self) -> i64 {
        self.native_id
    }

    /// The path the resolution went through.
    #[inline]
    pub fn method(&self) -> ResolutionMethod {
        self.method
    }
}

/// A source of candidate native visuals, for early resolution.
pub(crate) trait VisualSource {
    /// Every candidate format of the screen, as `(native id, decoded
    /// capabilities)`. An undecodable candidate comes through as `None`
    /// and stays in the list so indices line up with the platform's.
    fn enumerate(&self, desired: &Capabilities) -> Result<Vec<(i64, Option<Capabilities>)>>;

    /// The native id the platform itself would pick for `desired`, if it
    /// has an opinion.
    fn platform_recommended(&self, desired: &Capabilities) -> Option<i64>;
}

/// A drawable device whose pixel format can be read and set once, for late
/// resolution.
pub(crate) trait FormatDevice {
    /// The format already applied to the device, if one is.
    fn current_format(&self) -> Result<Option<Resolved>>;

    /// The candidates reachable through the pixel format extension, or
    /// `None` when the device has no extension path.
    fn enumerate_extended(
        &self,
        desired: &Capabilities,
    ) -> Result<Option<Vec<(i64, Option<Capabilities>)>>>;

    /// The candidates reachable through the legacy descriptor path.
    fn enumerate_legacy(&self, desired: &Capabilities) -> Result<Vec<(i64, Option<Capabilities>)>>;

    /// The native id the platform itself would pick for `desired`, if it
    /// has an opinion.
    fn platform_recommended(&self, desired: &Capabilities) -> Option<i64>;

    /// Apply the format with `native_id` to the device. Called exactly
    /// once per device, and never when a format was already applied.
    fn set_format(&self, native_id: i64) -> Result<()>;
}

/// A lazily resolved graphics configuration for one screen.
pub struct GraphicsConfiguration {
    screen: i32,
    desired: Capabilities,
    chooser: Arc<dyn CapabilitiesChooser + Send + Sync>,
    resolved: Mutex<Option<Resolved>>,
}

impl fmt::Debug for GraphicsConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsConfiguration")
            .field("screen", &self.screen)
            .field("desired", &self.desired)
            .field("resolved", &*self.resolved.lock().unwrap())
            .finish_non_exhaustive()
    }
}

impl GraphicsConfiguration {
    /// Create an undetermined configuration for the given desired
    /// capabilities, using the stock chooser.
    pub fn new(screen: i32, desired: Capabilities) -> Self {
        Self::with_chooser(screen, desired, Arc::new(DefaultChooser))
    }

    /// Create an undetermined configuration with a custom chooser.
    pub fn with_chooser(
        screen: i32,
        desired: Capabilities,
        chooser: Arc<dyn CapabilitiesChooser + Send + Sync>,
    ) -> Self {
        Self { screen, desired, chooser, resolved: Mutex::new(None) }
    }

    /// The screen this configuration belongs to.
    #[inline]
    pub fn screen(&self) -> i32 {
        self.screen
    }

    /// The capabilities this configuration was requested with.
    #[inline]
    pub fn desired_capabilities(&self) -> &Capabilities {
        &self.desired
    }

    /// Whether the configuration has been resolved.
    pub fn is_determined(&self) -> bool {
        self.resolved.lock().unwrap().is_some()
    }

    /// The recorded resolution, once there is one.
    pub fn resolved(&self) -> Option<Resolved> {
        self.resolved.lock().unwrap().clone()
    }

    /// Record `outcome` unless a resolution was recorded before, and hand
    /// back whatever is recorded afterwards. The transition happens at
    /// most once; later calls with different values are no-ops.
    pub(crate) fn determine(&self, outcome: Resolved) -> Resolved {
        let mut resolved = self.resolved.lock().unwrap();
        resolved.get_or_insert(outcome).clone()
    }

    /// Resolve by picking a native visual before the drawable exists.
    ///
    /// The winner's capabilities are recorded in `cache` so later lookups
    /// by native id skip the platform round trip. An already resolved
    /// configuration hands back its recorded outcome without consulting
    /// the platform again.
    pub(crate) fn resolve_early<S: VisualSource>(
        &self,
        source: &S,
        cache: &FormatCache,
    ) -> Result<Resolved> {
        if let Some(resolved) = self.resolved() {
            return Ok(resolved);
        }

        let candidates = source.enumerate(&self.desired)?;
        let recommended = source.platform_recommended(&self.desired);
        let index = self.choose(&candidates, recommended)?;

        let (native_id, caps) = &candidates[index];
        let caps = caps.clone().ok_or(ErrorKind::BadConfig)?;
        cache.insert(self.screen, *native_id, caps.clone());

        Ok(self.determine(Resolved {
            caps,
            native_id: *native_id,
            method: ResolutionMethod::Extension,
        }))
    }

    /// Resolve against an already existing drawable.
    ///
    /// When the drawable already carries a pixel format, that format is
    /// adopted as-is; the desired capabilities can't be honored and the
    /// chooser never runs, since the platform forbids changing an applied
    /// format. Otherwise the chooser picks among the device's candidates,
    /// through the extension path when the device has one and through the
    /// legacy descriptors when not, and the winner gets applied.
    pub(crate) fn resolve_late<D: FormatDevice>(&self, device: &D) -> Result<Resolved> {
        if let Some(resolved) = self.resolved() {
            return Ok(resolved);
        }

        if let Some(existing) = device.current_format()? {
            log::debug!(
                "drawable already carries pixel format {}, adopting it",
                existing.native_id
            );
            return Ok(self.determine(existing));
        }

        let (candidates, method) = match device.enumerate_extended(&self.desired)? {
            Some(candidates) => (candidates, ResolutionMethod::Extension),
            None => (device.enumerate_legacy(&self.desired)?, ResolutionMethod::LegacyDescriptor),
        };
        let recommended = device.platform_recommended(&self.desired);
        let index = self.choose(&candidates, recommended)?;

        let (native_id, caps) = &candidates[index];
        let caps = caps.clone().ok_or(ErrorKind::BadConfig)?;
        device.set_format(*native_id)?;

        Ok(self.determine(Resolved { caps, native_id: *native_id, method }))
    }

    /// Resolve against `device` and make sure the device ends up carrying
    /// the outcome's pixel format.
    ///
    /// An already resolved configuration reuses its recorded outcome, but
    /// each fresh device context still needs that format applied before
    /// anything renders against it. A format the device already carries is
    /// left untouched.
    pub(crate) fn apply_to<D: FormatDevice>(&self, device: &D) -> Result<Resolved> {
        let resolved = match self.resolved() {
            Some(resolved) => resolved,
            None => return self.resolve_late(device),
        };

        if device.current_format()?.is_none() {
            device.set_format(resolved.native_id)?;
        }
        Ok(resolved)
    }

    /// Run the chooser. The platform recommendation arrives as a native
    /// id and is screened first: one that doesn't name a decodable
    /// candidate is dropped rather than trusted.
    fn choose(
        &self,
        candidates: &[(i64, Option<Capabilities>)],
        recommended: Option<i64>,
    ) -> Result<usize> {
        let recommended = recommended.and_then(|id| {
            candidates.iter().position(|(candidate_id, caps)| *candidate_id == id && caps.is_some())
        });

        let decoded: Vec<Option<Capabilities>> =
            candidates.iter().map(|(_, caps)| caps.clone()).collect();
        self.chooser.choose(&self.desired, &decoded, recommended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapabilitiesBuilder;
    use crate::error::Error;
    use std::cell::{Cell, RefCell};

    fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Capabilities {
        CapabilitiesBuilder::new()
            .with_color_sizes(red, green, blue)
            .with_alpha_size(alpha)
            .build()
    }

    struct MockSource {
        candidates: Vec<(i64, Option<Capabilities>)>,
        recommended: Option<i64>,
        enumerations: Cell<usize>,
    }

    impl MockSource {
        fn new(candidates: Vec<(i64, Option<Capabilities>)>, recommended: Option<i64>) -> Self {
            Self { candidates, recommended, enumerations: Cell::new(0) }
        }
    }

    impl VisualSource for MockSource {
        fn enumerate(&self, _desired: &Capabilities) -> Result<Vec<(i64, Option<Capabilities>)>> {
            self.enumerations.set(self.enumerations.get() + 1);
            Ok(self.candidates.clone())
        }

        fn platform_recommended(&self, _desired: &Capabilities) -> Option<i64> {
            self.recommended
        }
    }

    struct MockDevice {
        current: Option<Resolved>,
        extended: Option<Vec<(i64, Option<Capabilities>)>>,
        legacy: Vec<(i64, Option<Capabilities>)>,
        recommended: Option<i64>,
        applied: RefCell<Vec<i64>>,
        set_fails: bool,
    }

    impl MockDevice {
        fn extension(candidates: Vec<(i64, Option<Capabilities>)>) -> Self {
            Self {
                current: None,
                extended: Some(candidates),
                legacy: Vec::new(),
                recommended: None,
                applied: RefCell::new(Vec::new()),
                set_fails: false,
            }
        }

        fn legacy_only(candidates: Vec<(i64, Option<Capabilities>)>) -> Self {
            Self {
                current: None,
                extended: None,
                legacy: candidates,
                recommended: None,
                applied: RefCell::new(Vec::new()),
                set_fails: false,
            }
        }
    }

    impl FormatDevice for MockDevice {
        fn current_format(&self) -> Result<Option<Resolved>> {
            Ok(self.current.clone())
        }

        fn enumerate_extended(
            &self,
            _desired: &Capabilities,
        ) -> Result<Option<Vec<(i64, Option<Capabilities>)>>> {
            Ok(self.extended.clone())
        }

        fn enumerate_legacy(
            &self,
            _desired: &Capabilities,
        ) -> Result<Vec<(i64, Option<Capabilities>)>> {
            Ok(self.legacy.clone())
        }

        fn platform_recommended(&self, _desired: &Capabilities) -> Option<i64> {
            self.recommended
        }

        fn set_format(&self, native_id: i64) -> Result<()> {
            if self.set_fails {
                return Err(Error::new(Some(5), None, ErrorKind::BadConfig));
            }
            self.applied.borrow_mut().push(native_id);
            Ok(())
        }
    }

    #[test]
    fn early_resolution_is_monotonic() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let cache = FormatCache::new();
        let source =
            MockSource::new(vec![(33, Some(rgba(5, 6, 5, 0))), (34, Some(rgba(8, 8, 8, 8)))], None);

        let first = config.resolve_early(&source, &cache).unwrap();
        assert_eq!(first.native_id(), 34);
        assert_eq!(first.method(), ResolutionMethod::Extension);
        assert_eq!(first.capabilities(), &rgba(8, 8, 8, 8));
        assert!(config.is_determined());

        // A second resolution reuses the outcome without re-enumerating.
        let second = config.resolve_early(&source, &cache).unwrap();
        assert_eq!(second.native_id(), 34);
        assert_eq!(source.enumerations.get(), 1);
    }

    #[test]
    fn early_resolution_populates_the_cache() {
        let config = GraphicsConfiguration::new(2, rgba(8, 8, 8, 8));
        let cache = FormatCache::new();
        let source = MockSource::new(vec![(40, Some(rgba(8, 8, 8, 8)))], None);

        config.resolve_early(&source, &cache).unwrap();
        assert_eq!(cache.get(2, 40), Some(rgba(8, 8, 8, 8)));
        // Other screens are unaffected.
        assert_eq!(cache.get(0, 40), None);
    }

    #[test]
    fn recommendation_is_honored_when_it_decodes() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let cache = FormatCache::new();
        let source = MockSource::new(
            vec![(10, Some(rgba(8, 8, 8, 8))), (11, Some(rgba(5, 6, 5, 0)))],
            Some(11),
        );

        assert_eq!(config.resolve_early(&source, &cache).unwrap().native_id(), 11);
    }

    #[test]
    fn bogus_recommendation_is_screened_out() {
        let cache = FormatCache::new();

        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let unknown_id = MockSource::new(vec![(10, Some(rgba(8, 8, 8, 8)))], Some(99));
        assert_eq!(config.resolve_early(&unknown_id, &cache).unwrap().native_id(), 10);

        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let undecodable = MockSource::new(vec![(10, None), (11, Some(rgba(8, 8, 8, 8)))], Some(10));
        assert_eq!(config.resolve_early(&undecodable, &cache).unwrap().native_id(), 11);
    }

    #[test]
    fn late_resolution_applies_the_winner_once() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let device =
            MockDevice::extension(vec![(1, Some(rgba(5, 6, 5, 0))), (2, Some(rgba(8, 8, 8, 8)))]);

        let resolved = config.resolve_late(&device).unwrap();
        assert_eq!(resolved.method(), ResolutionMethod::Extension);
        assert_eq!(resolved.native_id(), 2);
        assert_eq!(*device.applied.borrow(), vec![2]);

        // Resolving again must not touch the device a second time.
        config.resolve_late(&device).unwrap();
        assert_eq!(*device.applied.borrow(), vec![2]);
    }

    #[test]
    fn missing_extension_path_falls_back_to_legacy() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let device = MockDevice::legacy_only(vec![(3, Some(rgba(8, 8, 8, 0)))]);

        let resolved = config.resolve_late(&device).unwrap();
        assert_eq!(resolved.method(), ResolutionMethod::LegacyDescriptor);
        assert_eq!(resolved.native_id(), 3);
        assert_eq!(*device.applied.borrow(), vec![3]);
    }

    #[test]
    fn existing_device_format_is_adopted_untouched() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let mut device = MockDevice::extension(vec![(1, Some(rgba(8, 8, 8, 8)))]);
        device.current = Some(Resolved {
            caps: rgba(5, 6, 5, 0),
            native_id: 3,
            method: ResolutionMethod::LegacyDescriptor,
        });

        let resolved = config.resolve_late(&device).unwrap();
        // The granted capabilities are the drawable's, not the desired ones.
        assert_eq!(resolved.capabilities(), &rgba(5, 6, 5, 0));
        assert_eq!(resolved.native_id(), 3);
        assert!(device.applied.borrow().is_empty());
    }

    #[test]
    fn failed_application_leaves_the_config_undetermined() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let mut device = MockDevice::extension(vec![(1, Some(rgba(8, 8, 8, 8)))]);
        device.set_fails = true;

        let err = config.resolve_late(&device).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::BadConfig);
        assert!(!config.is_determined());

        // The retry can then succeed.
        device.set_fails = false;
        assert!(config.resolve_late(&device).is_ok());
        assert!(config.is_determined());
    }

    #[test]
    fn late_after_early_reuses_the_outcome() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let cache = FormatCache::new();
        let source = MockSource::new(vec![(12, Some(rgba(8, 8, 8, 8)))], None);
        let early = config.resolve_early(&source, &cache).unwrap();

        let device = MockDevice::extension(vec![(1, Some(rgba(5, 6, 5, 0)))]);
        let late = config.resolve_late(&device).unwrap();
        assert_eq!(late, early);
        assert!(device.applied.borrow().is_empty());
    }

    #[test]
    fn custom_chooser_sees_every_candidate() {
        use crate::chooser::CapabilitiesChooser;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Recording(Arc<AtomicUsize>);

        impl CapabilitiesChooser for Recording {
            fn choose(
                &self,
                _desired: &Capabilities,
                candidates: &[Option<Capabilities>],
                recommended: Option<usize>,
            ) -> Result<usize> {
                self.0.store(candidates.len(), Ordering::Relaxed);
                recommended.ok_or_else(|| ErrorKind::SelectionExhausted.into())
            }
        }

        // The platform's own pick narrows nothing: the whole enumeration
        // reaches the chooser and the pick only arrives as the
        // recommendation.
        let seen = Arc::new(AtomicUsize::new(0));
        let config = GraphicsConfiguration::with_chooser(
            0,
            rgba(8, 8, 8, 8),
            Arc::new(Recording(seen.clone())),
        );
        let cache = FormatCache::new();
        let source = MockSource::new(
            vec![(1, Some(rgba(5, 6, 5, 0))), (2, Some(rgba(8, 8, 8, 8))), (3, None)],
            Some(2),
        );

        let resolved = config.resolve_early(&source, &cache).unwrap();
        assert_eq!(resolved.native_id(), 2);
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn resolved_config_still_stamps_a_fresh_device() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let first = MockDevice::extension(vec![(2, Some(rgba(8, 8, 8, 8)))]);
        config.apply_to(&first).unwrap();
        assert_eq!(*first.applied.borrow(), vec![2]);

        // A second device context resolves to the recorded outcome but
        // must still receive the format itself.
        let second = MockDevice::extension(vec![(2, Some(rgba(8, 8, 8, 8)))]);
        let resolved = config.apply_to(&second).unwrap();
        assert_eq!(resolved.native_id(), 2);
        assert_eq!(*second.applied.borrow(), vec![2]);
    }

    #[test]
    fn apply_leaves_a_carried_format_alone() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let first = MockDevice::extension(vec![(2, Some(rgba(8, 8, 8, 8)))]);
        config.apply_to(&first).unwrap();

        let mut second = MockDevice::extension(vec![(2, Some(rgba(8, 8, 8, 8)))]);
        second.current = Some(Resolved {
            caps: rgba(8, 8, 8, 8),
            native_id: 2,
            method: ResolutionMethod::Extension,
        });
        config.apply_to(&second).unwrap();
        assert!(second.applied.borrow().is_empty());
    }

    #[test]
    fn determination_is_first_writer_wins() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let first = Resolved {
            caps: rgba(8, 8, 8, 8),
            native_id: 1,
            method: ResolutionMethod::Extension,
        };
        let second = Resolved {
            caps: rgba(5, 6, 5, 0),
            native_id: 2,
            method: ResolutionMethod::LegacyDescriptor,
        };

        assert_eq!(config.determine(first.clone()), first);
        // Re-determining with different values is a no-op.
        assert_eq!(config.determine(second), first);
    }

    #[test]
    fn exhausted_candidates_surface_as_an_error() {
        let config = GraphicsConfiguration::new(0, rgba(8, 8, 8, 8));
        let cache = FormatCache::new();
        let source = MockSource::new(vec![(1, None), (2, None)], None);
        let err = config.resolve_early(&source, &cache).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::SelectionExhausted);
        assert!(!config.is_determined());
    }
}
