//! OpenGL context requests and the version negotiation procedure.
//!
//! Context creation is a two phase affair on both GLX and WGL: the ARB
//! creation entry point that understands versions, profiles and flags can
//! only be resolved while some context is already current, and the only
//! way to get one of those is the legacy entry point. The [`negotiate`]
//! procedure drives that dance and is shared by the backends through the
//! [`ContextOps`] trait.

use std::fmt;

use crate::error::{ErrorKind, Result};
use crate::private::gl_api_dispatch;
use crate::surface::{Surface, SurfaceTypeTrait};

/// A context version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version of the context.
    pub major: u8,
    /// Minor version of the context.
    pub minor: u8,
}

impl Version {
    /// Create a new context version.
    #[inline]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The profile a modern context should implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlProfile {
    /// The core profile, stripped of the deprecated fixed function
    /// pipeline.
    Core,
    /// The compatibility profile with the full legacy API surface.
    Compatibility,
}

/// The attributes a context is requested with.
///
/// Built with the [`ContextAttributesBuilder`]. The default request has no
/// version pinned, no profile forced and no flags set, which makes it
/// satisfiable by a legacy context when the driver offers nothing better.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContextAttributes {
    pub(crate) version: Option<Version>,
    pub(crate) profile: Option<GlProfile>,
    pub(crate) debug: bool,
    pub(crate) forward_compatible: bool,
}

impl ContextAttributes {
    /// Whether only a context created through the ARB entry point can
    /// satisfy this request. Legacy creation can't pin a version at or
    /// above 3.0, pick a profile, or set any flag.
    pub(crate) fn requires_modern(&self) -> bool {
        self.version.map_or(false, |version| version.major >= 3)
            || self.profile.is_some()
            || self.debug
            || self.forward_compatible
    }
}

/// Builder for [`ContextAttributes`].
#[derive(Debug, Default, Clone)]
pub struct ContextAttributesBuilder {
    attrs: ContextAttributes,
}

impl ContextAttributesBuilder {
    /// Create a new builder with the default request.
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Request a particular context version.
    ///
    /// By default the driver picks the highest version it can.
    #[inline]
    pub fn with_version(mut self, version: Version) -> Self {
        self.attrs.version = Some(version);
        self
    }

    /// Request a particular profile.
    ///
    /// By default one is picked from the requested version, see
    /// [`pick_profile`].
    #[inline]
    pub fn with_profile(mut self, profile: GlProfile) -> Self {
        self.attrs.profile = Some(profile);
        self
    }

    /// Request a debug context.
    ///
    /// Debug contexts offer richer diagnostics at a runtime cost. The
    /// default is `false`.
    #[inline]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.attrs.debug = debug;
        self
    }

    /// Request a forward compatible context, one with all the deprecated
    /// API removed.
    ///
    /// The default is `false`.
    #[inline]
    pub fn with_forward_compatible(mut self, forward_compatible: bool) -> Self {
        self.attrs.forward_compatible = forward_compatible;
        self
    }

    /// Build the context attributes.
    #[must_use]
    pub fn build(self) -> ContextAttributes {
        self.attrs
    }
}

/// Resolve the profile to ask the ARB entry point for.
///
/// An explicit choice always wins. Otherwise the core profile is used for
/// versions that have one (3.2 and up) and when no version was pinned,
/// since in that case the driver hands out its newest.
pub(crate) fn pick_profile(profile: Option<GlProfile>, version: Option<Version>) -> GlProfile {
    match (profile, version) {
        (Some(profile), _) => profile,
        (None, Some(version)) if version >= Version::new(3, 2) => GlProfile::Core,
        (None, Some(_)) => GlProfile::Compatibility,
        (None, None) => GlProfile::Core,
    }
}

/// The backend operations [`negotiate`] is driven by.
///
/// `Raw` is the backend's owned native context handle; the procedure
/// creates and destroys them strictly through these methods.
pub(crate) trait ContextOps {
    type Raw;

    /// Create a context through the legacy entry point, sharing object
    /// namespaces with `share` when given.
    fn create_legacy(&self, share: Option<&Self::Raw>) -> Result<Self::Raw>;

    /// Make `context` current against the backend's probe drawable.
    fn make_current_probe(&self, context: &Self::Raw) -> Result<()>;

    /// Whether the ARB creation entry point resolves. Only meaningful
    /// while a context made current by [`make_current_probe`] is current.
    fn has_arb_create(&self) -> bool;

    /// Create a context through the ARB entry point.
    fn create_arb(&self, request: &ModernRequest, share: Option<&Self::Raw>) -> Result<Self::Raw>;

    /// Release whatever context is current on the calling thread.
    fn clear_current(&self);

    /// Destroy a context handed out by one of the create methods.
    fn destroy(&self, context: Self::Raw);
}

/// The fully resolved request passed to [`ContextOps::create_arb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ModernRequest {
    /// The version to pin, or `None` for the driver's newest.
    pub(crate) version: Option<Version>,
    /// The profile to ask for, only meaningful for 3.2 and up.
    pub(crate) profile: GlProfile,
    pub(crate) debug: bool,
    pub(crate) forward_compatible: bool,
}

impl ModernRequest {
    fn from_attrs(attrs: &ContextAttributes) -> Self {
        Self {
            version: attrs.version,
            profile: pick_profile(attrs.profile, attrs.version),
            debug: attrs.debug,
            forward_compatible: attrs.forward_compatible,
        }
    }
}

/// The owned outcome of a [`negotiate`] run.
///
/// Destruction goes through [`destroy_with`][Self::destroy_with] so the
/// backend that created the raw handle also frees it; doing so twice is
/// a no-op.
#[derive(Debug)]
pub(crate) struct Negotiated<R> {
    raw: Option<R>,
    modern: bool,
}

impl<R> Negotiated<R> {
    /// Present an already negotiated context, such as a sharee a caller
    /// holds on to, to another [`negotiate`] run.
    pub(crate) fn from_parts(raw: R, modern: bool) -> Self {
        Self { raw: Some(raw), modern }
    }

    /// The native context handle. `None` once destroyed.
    pub(crate) fn raw(&self) -> Option<&R> {
        self.raw.as_ref()
    }

    /// Whether the context came out of the ARB entry point.
    pub(crate) fn is_modern(&self) -> bool {
        self.modern
    }

    /// Destroy the native context, once.
    pub(crate) fn destroy_with<O: ContextOps<Raw = R>>(&mut self, ops: &O) {
        if let Some(raw) = self.raw.take() {
            ops.destroy(raw);
        }
    }
}

/// Create a context satisfying `attrs`, upgrading through the ARB entry
/// point when the driver has it.
///
/// A temporary legacy context is created and made current first; failing
/// to make it current means the drawable or the driver is broken beyond
/// what a fallback could fix, so that error is final. When the ARB entry
/// point is missing or its creation attempt fails, the request falls back
/// to the temporary context itself, unless the request
/// [requires a modern context][ContextAttributes::requires_modern].
///
/// A sharee that itself came out of the ARB entry point proves the modern
/// path works, so the temporary context dance is skipped for it. Sharing
/// failures are never swallowed: a context that silently doesn't share
/// its namespaces corrupts every consumer of the shared objects.
pub(crate) fn negotiate<O: ContextOps>(
    ops: &O,
    attrs: &ContextAttributes,
    share: Option<&Negotiated<O::Raw>>,
) -> Result<Negotiated<O::Raw>> {
    let share_raw = match share {
        Some(share) => Some(share.raw().ok_or(ErrorKind::BadContext)?),
        None => None,
    };

    if share.map_or(false, |share| share.is_modern()) {
        let request = ModernRequest::from_attrs(attrs);
        match ops.create_arb(&request, share_raw) {
            Ok(modern) => return Ok(Negotiated { raw: Some(modern), modern: true }),
            // The full procedure below re-probes from scratch.
            Err(err) => log::debug!("direct modern creation next to a modern sharee failed: {err}"),
        }
    }

    let temp = ops.create_legacy(share_raw)?;

    if let Err(err) = ops.make_current_probe(&temp) {
        ops.destroy(temp);
        return Err(err);
    }

    let modern_error = if ops.has_arb_create() {
        let request = ModernRequest::from_attrs(attrs);
        match ops.create_arb(&request, share_raw) {
            Ok(modern) => {
                ops.clear_current();
                ops.destroy(temp);
                return Ok(Negotiated { raw: Some(modern), modern: true });
            },
            Err(err) => err,
        }
    } else {
        ErrorKind::NotSupported("the context creation extension is missing").into()
    };

    if attrs.requires_modern() {
        ops.clear_current();
        ops.destroy(temp);
        return Err(modern_error);
    }

    log::warn!("modern context creation failed, using a legacy context: {modern_error}");
    ops.clear_current();
    Ok(Negotiated { raw: Some(temp), modern: false })
}

/// A context that is known not to be current on any thread.
///
/// Freely movable between threads; [`make_current`][Self::make_current]
/// consumes it and hands back a thread bound
/// [`PossiblyCurrentContext`].
#[derive(Debug)]
pub enum NotCurrentContext {
    /// The GLX context.
    #[cfg(glx_backend)]
    Glx(crate::api::glx::context::NotCurrentContext),
    /// The WGL context.
    #[cfg(wgl_backend)]
    Wgl(crate::api::wgl::context::NotCurrentContext),
}

impl NotCurrentContext {
    /// Make the context current on the calling thread with `surface` as
    /// both the draw and the read drawable.
    pub fn make_current<T: SurfaceTypeTrait>(
        self,
        surface: &Surface<T>,
    ) -> Result<PossiblyCurrentContext> {
        match (self, surface) {
            #[cfg(glx_backend)]
            (Self::Glx(context), Surface::Glx(surface)) => {
                context.make_current(surface).map(PossiblyCurrentContext::Glx)
            },
            #[cfg(wgl_backend)]
            (Self::Wgl(context), Surface::Wgl(surface)) => {
                context.make_current(surface).map(PossiblyCurrentContext::Wgl)
            },
            #[allow(unreachable_patterns)]
            _ => Err(ErrorKind::BadMatch.into()),
        }
    }

    /// Treat the context as possibly current without making it current.
    ///
    /// Useful when the context was made current by means outside this
    /// crate.
    pub fn treat_as_possibly_current(self) -> PossiblyCurrentContext {
        gl_api_dispatch!(self; Self(context) => context.treat_as_possibly_current(); as PossiblyCurrentContext)
    }

    /// Whether the context came out of the modern creation path.
    pub fn is_modern(&self) -> bool {
        gl_api_dispatch!(self; Self(context) => context.is_modern())
    }
}

/// A context that may be current on the calling thread.
///
/// Not `Send`: a context that was ever current must stay on the thread
/// that made it so until [`make_not_current`][Self::make_not_current]
/// releases it.
#[derive(Debug)]
pub enum PossiblyCurrentContext {
    /// The GLX context.
    #[cfg(glx_backend)]
    Glx(crate::api::glx::context::PossiblyCurrentContext),
    /// The WGL context.
    #[cfg(wgl_backend)]
    Wgl(crate::api::wgl::context::PossiblyCurrentContext),
}

impl PossiblyCurrentContext {
    /// Whether the context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        gl_api_dispatch!(self; Self(context) => context.is_current())
    }

    /// Make the context current on the calling thread with `surface` as
    /// both the draw and the read drawable.
    pub fn make_current<T: SurfaceTypeTrait>(&self, surface: &Surface<T>) -> Result<()> {
        match (self, surface) {
            #[cfg(glx_backend)]
            (Self::Glx(context), Surface::Glx(surface)) => context.make_current(surface),
            #[cfg(wgl_backend)]
            (Self::Wgl(context), Surface::Wgl(surface)) => context.make_current(surface),
            #[allow(unreachable_patterns)]
            _ => Err(ErrorKind::BadMatch.into()),
        }
    }

    /// Make the context current with separate draw and read drawables.
    ///
    /// Requires [`DisplayFeatures::READ_DRAWABLE`].
    ///
    /// [`DisplayFeatures::READ_DRAWABLE`]:
    /// crate::display::DisplayFeatures::READ_DRAWABLE
    pub fn make_current_draw_read<T: SurfaceTypeTrait, U: SurfaceTypeTrait>(
        &self,
        draw: &Surface<T>,
        read: &Surface<U>,
    ) -> Result<()> {
        match (self, draw, read) {
            #[cfg(glx_backend)]
            (Self::Glx(context), Surface::Glx(draw), Surface::Glx(read)) => {
                context.make_current_draw_read(draw, read)
            },
            #[cfg(wgl_backend)]
            (Self::Wgl(context), Surface::Wgl(draw), Surface::Wgl(read)) => {
                context.make_current_draw_read(draw, read)
            },
            #[allow(unreachable_patterns)]
            _ => Err(ErrorKind::BadMatch.into()),
        }
    }

    /// Release the context from the calling thread.
    pub fn make_not_current(self) -> Result<NotCurrentContext> {
        match self {
            #[cfg(glx_backend)]
            Self::Glx(context) => context.make_not_current().map(NotCurrentContext::Glx),
            #[cfg(wgl_backend)]
            Self::Wgl(context) => context.make_not_current().map(NotCurrentContext::Wgl),
        }
    }

    /// Whether the context came out of the modern creation path.
    pub fn is_modern(&self) -> bool {
        gl_api_dispatch!(self; Self(context) => context.is_modern())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::{Cell, RefCell};

    /// Scripted backend recording every context it created or destroyed.
    struct MockOps {
        next_id: Cell<u32>,
        destroyed: RefCell<Vec<u32>>,
        shares_seen: RefCell<Vec<Option<u32>>>,
        arb_requests: RefCell<Vec<ModernRequest>>,
        current: Cell<Option<u32>>,
        legacy_fails: bool,
        make_current_fails: bool,
        has_arb: bool,
        arb_fails: bool,
    }

    impl MockOps {
        fn new() -> Self {
            Self {
                next_id: Cell::new(1),
                destroyed: RefCell::new(Vec::new()),
                shares_seen: RefCell::new(Vec::new()),
                arb_requests: RefCell::new(Vec::new()),
                current: Cell::new(None),
                legacy_fails: false,
                make_current_fails: false,
                has_arb: true,
                arb_fails: false,
            }
        }

        fn fresh_id(&self) -> u32 {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            id
        }
    }

    impl ContextOps for MockOps {
        type Raw = u32;

        fn create_legacy(&self, share: Option<&u32>) -> Result<u32> {
            self.shares_seen.borrow_mut().push(share.copied());
            if self.legacy_fails {
                return Err(Error::new(Some(1), Some("BadMatch".into()), ErrorKind::BadConfig));
            }
            Ok(self.fresh_id())
        }

        fn make_current_probe(&self, context: &u32) -> Result<()> {
            if self.make_current_fails {
                return Err(Error::new(None, None, ErrorKind::BadContext));
            }
            self.current.set(Some(*context));
            Ok(())
        }

        fn has_arb_create(&self) -> bool {
            self.has_arb
        }

        fn create_arb(&self, request: &ModernRequest, share: Option<&u32>) -> Result<u32> {
            self.arb_requests.borrow_mut().push(*request);
            self.shares_seen.borrow_mut().push(share.copied());
            if self.arb_fails {
                return Err(Error::new(Some(2), Some("GLXBadFBConfig".into()), ErrorKind::BadConfig));
            }
            Ok(self.fresh_id())
        }

        fn clear_current(&self) {
            self.current.set(None);
        }

        fn destroy(&self, context: u32) {
            self.destroyed.borrow_mut().push(context);
        }
    }

    #[test]
    fn modern_path_destroys_the_temporary() {
        let ops = MockOps::new();
        let attrs = ContextAttributesBuilder::new().with_version(Version::new(3, 3)).build();

        let negotiated = negotiate(&ops, &attrs, None).unwrap();
        assert!(negotiated.is_modern());
        // Context 1 was the temporary, 2 the real one.
        assert_eq!(negotiated.raw(), Some(&2));
        assert_eq!(*ops.destroyed.borrow(), vec![1]);
        assert_eq!(ops.current.get(), None);
    }

    #[test]
    fn arb_request_carries_the_resolved_profile() {
        let ops = MockOps::new();
        let attrs = ContextAttributesBuilder::new().with_version(Version::new(3, 2)).build();

        negotiate(&ops, &attrs, None).unwrap();
        let requests = ops.arb_requests.borrow();
        assert_eq!(
            *requests,
            vec![ModernRequest {
                version: Some(Version::new(3, 2)),
                profile: GlProfile::Core,
                debug: false,
                forward_compatible: false,
            }]
        );
    }

    #[test]
    fn missing_arb_falls_back_for_modest_requests() {
        let mut ops = MockOps::new();
        ops.has_arb = false;
        let attrs = ContextAttributesBuilder::new().with_version(Version::new(2, 1)).build();

        let negotiated = negotiate(&ops, &attrs, None).unwrap();
        assert!(!negotiated.is_modern());
        // The temporary itself was promoted; nothing got destroyed.
        assert_eq!(negotiated.raw(), Some(&1));
        assert!(ops.destroyed.borrow().is_empty());
        assert_eq!(ops.current.get(), None);
    }

    #[test]
    fn missing_arb_fails_demanding_requests() {
        let mut ops = MockOps::new();
        ops.has_arb = false;
        let attrs = ContextAttributesBuilder::new().with_version(Version::new(3, 3)).build();

        let err = negotiate(&ops, &attrs, None).unwrap_err();
        assert!(err.not_supported());
        assert_eq!(*ops.destroyed.borrow(), vec![1]);
    }

    #[test]
    fn failed_arb_creation_falls_back_for_modest_requests() {
        let mut ops = MockOps::new();
        ops.arb_fails = true;
        let attrs = ContextAttributesBuilder::new().build();

        let negotiated = negotiate(&ops, &attrs, None).unwrap();
        assert!(!negotiated.is_modern());
        assert_eq!(negotiated.raw(), Some(&1));
    }

    #[test]
    fn flags_alone_require_a_modern_context() {
        let mut ops = MockOps::new();
        ops.arb_fails = true;
        let attrs = ContextAttributesBuilder::new().with_debug(true).build();

        let err = negotiate(&ops, &attrs, None).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::BadConfig);
        assert_eq!(*ops.destroyed.borrow(), vec![1]);
    }

    #[test]
    fn make_current_failure_is_final() {
        let mut ops = MockOps::new();
        ops.make_current_fails = true;
        // A request the fallback could otherwise satisfy.
        let attrs = ContextAttributesBuilder::new().build();

        let err = negotiate(&ops, &attrs, None).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::BadContext);
        assert_eq!(*ops.destroyed.borrow(), vec![1]);
    }

    fn sharee(raw: u32, modern: bool) -> Negotiated<u32> {
        Negotiated { raw: Some(raw), modern }
    }

    #[test]
    fn sharing_failure_is_loud() {
        let mut ops = MockOps::new();
        ops.legacy_fails = true;
        let attrs = ContextAttributesBuilder::new().build();

        let err = negotiate(&ops, &attrs, Some(&sharee(7, false))).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::BadConfig);
        assert_eq!(*ops.shares_seen.borrow(), vec![Some(7)]);
    }

    #[test]
    fn share_handle_reaches_both_entry_points() {
        let ops = MockOps::new();
        let attrs = ContextAttributesBuilder::new().build();

        negotiate(&ops, &attrs, Some(&sharee(9, false))).unwrap();
        assert_eq!(*ops.shares_seen.borrow(), vec![Some(9), Some(9)]);
    }

    #[test]
    fn modern_sharee_skips_the_temporary() {
        let ops = MockOps::new();
        let attrs = ContextAttributesBuilder::new().with_version(Version::new(4, 1)).build();

        let negotiated = negotiate(&ops, &attrs, Some(&sharee(9, true))).unwrap();
        assert!(negotiated.is_modern());
        // Only the ARB entry point saw the share; no legacy context was
        // created or destroyed along the way.
        assert_eq!(*ops.shares_seen.borrow(), vec![Some(9)]);
        assert!(ops.destroyed.borrow().is_empty());
    }

    #[test]
    fn failed_fast_path_reruns_the_full_procedure() {
        let mut ops = MockOps::new();
        ops.arb_fails = true;
        let attrs = ContextAttributesBuilder::new().build();

        let negotiated = negotiate(&ops, &attrs, Some(&sharee(9, true))).unwrap();
        assert!(!negotiated.is_modern());
        // Fast path attempt, then legacy temp, then the machine's attempt.
        assert_eq!(*ops.shares_seen.borrow(), vec![Some(9), Some(9), Some(9)]);
    }

    #[test]
    fn destroyed_sharee_is_rejected() {
        let ops = MockOps::new();
        let attrs = ContextAttributesBuilder::new().build();
        let mut dead = sharee(9, false);
        dead.destroy_with(&ops);

        let err = negotiate(&ops, &attrs, Some(&dead)).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::BadContext);
        assert!(ops.shares_seen.borrow().is_empty());
    }

    #[test]
    fn destroy_is_idempotent() {
        let ops = MockOps::new();
        let attrs = ContextAttributesBuilder::new().build();

        let mut negotiated = negotiate(&ops, &attrs, None).unwrap();
        let destroyed_before = ops.destroyed.borrow().len();
        negotiated.destroy_with(&ops);
        negotiated.destroy_with(&ops);
        assert_eq!(ops.destroyed.borrow().len(), destroyed_before + 1);
        assert!(negotiated.raw().is_none());
    }

    #[test]
    fn profile_resolution() {
        use GlProfile::*;
        assert_eq!(pick_profile(Some(Compatibility), Some(Version::new(4, 6))), Compatibility);
        assert_eq!(pick_profile(None, Some(Version::new(3, 2))), Core);
        assert_eq!(pick_profile(None, Some(Version::new(3, 1))), Compatibility);
        assert_eq!(pick_profile(None, Some(Version::new(2, 1))), Compatibility);
        assert_eq!(pick_profile(None, None), Core);
    }

    #[test]
    fn modern_requirement() {
        let modest = ContextAttributesBuilder::new().with_version(Version::new(2, 1)).build();
        assert!(!modest.requires_modern());
        assert!(!ContextAttributes::default().requires_modern());

        let versioned = ContextAttributesBuilder::new().with_version(Version::new(3, 0)).build();
        assert!(versioned.requires_modern());
        let profiled = ContextAttributesBuilder::new().with_profile(GlProfile::Core).build();
        assert!(profiled.requires_modern());
        let forward = ContextAttributesBuilder::new().with_forward_compatible(true).build();
        assert!(forward.requires_modern());
    }
}
