use smallvec::SmallVec;

use crate::core::ClassId;
use crate::physics::body::PhysicalBody;
use crate::scene::camera::CameraComponent;
use crate::scene::drawable::Drawable;
use crate::scene::light::{AnalyticLight, DirectionalLight, IblProbe};
use crate::scene::transform::Transform;
use crate::scene::{ActorKey, ComponentKey};

/// Named attachment point on a skinned component, driven by one joint of
/// the skeleton pose.
#[derive(Debug, Clone)]
pub struct Socket {
    pub name: String,
    /// Joint index into the owning skinned component's pose.
    pub joint: u32,
}

/// The closed set of spatial component kinds.
///
/// Polymorphism over scene components is finite, so the kinds are a tagged
/// variant rather than a class hierarchy; filter iteration goes through the
/// component's [`ClassId`].
#[derive(Debug)]
pub enum SceneKind {
    /// Pure transform node (attachment point, spring arm base, ...).
    Plain,
    Drawable(Drawable),
    Light(AnalyticLight),
    DirectionalLight(DirectionalLight),
    IblProbe(IblProbe),
    Camera(CameraComponent),
    Body(PhysicalBody),
}

impl SceneKind {
    /// Class id used for filter iteration over components.
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        use crate::core::class_id;
        match self {
            Self::Plain => class_id("SceneComponent"),
            Self::Drawable(d) => d.kind.class_id(),
            Self::Light(_) => class_id("AnalyticLightComponent"),
            Self::DirectionalLight(_) => class_id("DirectionalLightComponent"),
            Self::IblProbe(_) => class_id("IblProbeComponent"),
            Self::Camera(_) => class_id("CameraComponent"),
            Self::Body(_) => class_id("PhysicalBodyComponent"),
        }
    }
}

/// Spatial payload of a component: local transform, tree links and sockets.
#[derive(Debug)]
pub struct SceneComponent {
    pub transform: Transform,
    pub(crate) parent: Option<ComponentKey>,
    /// Socket index on the parent this component is attached to; `-1` when
    /// attached directly.
    pub(crate) socket_index: i32,
    pub(crate) children: SmallVec<[ComponentKey; 8]>,
    pub sockets: SmallVec<[Socket; 1]>,
    /// Set while the component waits in the world's bounds-update queue.
    pub(crate) bounds_update_queued: bool,
    pub kind: SceneKind,
}

impl SceneComponent {
    #[must_use]
    pub fn new(kind: SceneKind) -> Self {
        Self {
            transform: Transform::new(),
            parent: None,
            socket_index: -1,
            children: SmallVec::new(),
            sockets: SmallVec::new(),
            bounds_update_queued: false,
            kind,
        }
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<ComponentKey> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[ComponentKey] {
        &self.children
    }

    /// Socket this component is attached to on its parent, or `-1`.
    #[inline]
    #[must_use]
    pub fn attached_socket(&self) -> i32 {
        self.socket_index
    }

    #[inline]
    #[must_use]
    pub fn is_attached_to_socket(&self) -> bool {
        self.socket_index >= 0
    }

    /// Resolves a socket name on this component to its index, or `-1`.
    #[must_use]
    pub fn find_socket(&self, name: &str) -> i32 {
        self.sockets
            .iter()
            .position(|s| s.name == name)
            .map_or(-1, |i| i as i32)
    }

    /// True when this kind can drive sockets (skinned drawable).
    #[must_use]
    pub fn is_skinned(&self) -> bool {
        matches!(
            &self.kind,
            SceneKind::Drawable(d) if d.is_skinned()
        )
    }

    #[inline]
    #[must_use]
    pub fn as_drawable(&self) -> Option<&Drawable> {
        match &self.kind {
            SceneKind::Drawable(d) => Some(d),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_drawable_mut(&mut self) -> Option<&mut Drawable> {
        match &mut self.kind {
            SceneKind::Drawable(d) => Some(d),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_body(&self) -> Option<&PhysicalBody> {
        match &self.kind {
            SceneKind::Body(b) => Some(b),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_body_mut(&mut self) -> Option<&mut PhysicalBody> {
        match &mut self.kind {
            SceneKind::Body(b) => Some(b),
            _ => None,
        }
    }
}

/// A component attached to an actor.
///
/// Non-spatial components (`scene == None`) are pure behavior carriers;
/// spatial ones participate in the scene tree. The component is indexed at
/// `actor.components[index_in_actor]` for O(1) swap-removal during kickoff.
#[derive(Debug)]
pub struct ActorComponent {
    pub name: String,
    pub(crate) class: ClassId,
    pub(crate) owner: ActorKey,
    pub(crate) index_in_actor: usize,
    pub(crate) pending_kill: bool,
    pub scene: Option<SceneComponent>,
}

impl ActorComponent {
    #[must_use]
    pub fn new(name: &str, owner: ActorKey, scene: Option<SceneComponent>) -> Self {
        let class = scene.as_ref().map_or_else(
            || crate::core::class_id("ActorComponent"),
            |s| s.kind.class_id(),
        );
        Self {
            name: name.to_owned(),
            class,
            owner,
            index_in_actor: usize::MAX,
            pending_kill: false,
            scene,
        }
    }

    #[inline]
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class
    }

    #[inline]
    #[must_use]
    pub fn owner_actor(&self) -> ActorKey {
        self.owner
    }

    #[inline]
    #[must_use]
    pub fn is_pending_kill(&self) -> bool {
        self.pending_kill
    }

    #[inline]
    #[must_use]
    pub fn index_in_actor(&self) -> usize {
        self.index_in_actor
    }
}
