//! Scene description
//!
//! A JSON document describing bodies and the joints between them. Bodies are
//! referred to by name; joint anchors are world points at build time. A body
//! either lists its shapes, and its mass follows from their densities, or
//! gives mass and inertia directly. Scenes written in pixel units are converted
//! on the way in, except for mass, inertia and density which are always in
//! solver units.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tether_core::math::{Real, Vec2};
use tether_core::units::Units;

use crate::body::{Body, BodyHandle, BodyType};
use crate::config::{SimulationConfig, SpaceConfig};
use crate::error::{PhysicsError, Result};
use crate::joint::{AngleJoint, DistanceJoint, Joint, RevoluteJoint, RopeJoint, SpringJoint, WeldJoint};
use crate::mass::MassProperties;
use crate::simulation::Simulation;
use crate::space::Space;

/// Complete scene file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDef {
    pub name: Option<String>,
    pub units: Units,
    pub space: SpaceConfig,
    pub simulation: SimulationConfig,
    pub bodies: Vec<BodyDef>,
    pub joints: Vec<JointDef>,
}

/// One body in a scene
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub name: String,
    #[serde(alias = "type")]
    pub body_type: BodyType,
    /// Body origin in world space
    pub position: Vec2,
    pub angle: Real,
    pub velocity: Vec2,
    pub angular_velocity: Real,
    pub mass: Real,
    /// About the centre of mass
    pub inertia: Real,
    /// Centre of mass relative to the origin
    pub centroid: Vec2,
    pub fixed_rotation: bool,
    pub linear_damping: Real,
    pub angular_damping: Real,
    /// When present, replaces `mass`, `inertia` and `centroid`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<ShapeDef>,
}

/// Shape contributing mass to a body, in the body origin frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDef {
    Circle {
        #[serde(default)]
        center: Vec2,
        radius: Real,
        /// Non-zero for a ring
        #[serde(default)]
        inner_radius: Real,
        density: Real,
    },
    Segment {
        a: Vec2,
        b: Vec2,
        radius: Real,
        density: Real,
    },
    Poly {
        /// Counter-clockwise
        verts: Vec<Vec2>,
        density: Real,
    },
    #[serde(rename = "box")]
    Cuboid {
        width: Real,
        height: Real,
        density: Real,
    },
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            angle: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            mass: 1.0,
            inertia: 1.0,
            centroid: Vec2::ZERO,
            fixed_rotation: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            shapes: Vec::new(),
        }
    }
}

/// One joint in a scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointDef {
    pub body1: String,
    pub body2: String,
    #[serde(default)]
    pub collide_connected: bool,
    #[serde(default)]
    pub max_force: Option<Real>,
    #[serde(default)]
    pub breakable: bool,
    #[serde(flatten)]
    pub kind: JointKindDef,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleLimit {
    pub lower: Real,
    pub upper: Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorDef {
    pub speed: Real,
    pub max_torque: Real,
}

/// Per-kind joint settings, tagged by `"type"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JointKindDef {
    Revolute {
        anchor: Vec2,
        #[serde(default)]
        limit: Option<AngleLimit>,
        #[serde(default)]
        motor: Option<MotorDef>,
    },
    Distance {
        anchor1: Vec2,
        anchor2: Vec2,
        #[serde(default)]
        frequency_hz: Real,
        #[serde(default)]
        damping_ratio: Real,
        /// Defaults to the anchor separation
        #[serde(default)]
        rest_length: Option<Real>,
    },
    Rope {
        anchor1: Vec2,
        anchor2: Vec2,
        #[serde(default)]
        min_length: Real,
        /// Defaults to the anchor separation
        #[serde(default)]
        max_length: Option<Real>,
    },
    Weld {
        anchor: Vec2,
        /// Zero keeps the angle rigid
        #[serde(default)]
        frequency_hz: Real,
        #[serde(default)]
        damping_ratio: Real,
    },
    Spring {
        anchor1: Vec2,
        anchor2: Vec2,
        stiffness: Real,
        #[serde(default)]
        damping: Real,
        /// Defaults to the anchor separation
        #[serde(default)]
        rest_length: Option<Real>,
    },
    Angle,
}

/// A scene turned into a runnable simulation
#[derive(Debug)]
pub struct BuiltScene {
    pub simulation: Simulation,
    pub units: Units,
    /// Bodies in scene order
    pub bodies: Vec<(String, BodyHandle)>,
    names: AHashMap<String, BodyHandle>,
}

/// Serializable state of one body, in the scene's units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub name: String,
    /// Body origin
    pub position: Vec2,
    pub angle: Real,
    pub velocity: Vec2,
    pub angular_velocity: Real,
}

impl SceneDef {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Create the simulation, its bodies and its joints
    pub fn build(&self) -> Result<BuiltScene> {
        let mut simulation = Simulation::new(self.simulation, self.space)?;
        let mut names = AHashMap::with_capacity(self.bodies.len());
        let mut bodies = Vec::with_capacity(self.bodies.len());

        for def in &self.bodies {
            if names.contains_key(&def.name) {
                return Err(PhysicsError::DuplicateBody(def.name.clone()));
            }
            let handle = simulation.add_body(def.to_body(self.units)?);
            names.insert(def.name.clone(), handle);
            bodies.push((def.name.clone(), handle));
        }

        for def in &self.joints {
            let lookup = |name: &String| {
                names
                    .get(name)
                    .copied()
                    .ok_or_else(|| PhysicsError::UnknownBody(name.clone()))
            };
            let body1 = lookup(&def.body1)?;
            let body2 = lookup(&def.body2)?;
            def.add_to(simulation.space_mut(), body1, body2, self.units)?;
        }

        log::info!(
            "built scene '{}' with {} bodies and {} joints",
            self.name.as_deref().unwrap_or("unnamed"),
            simulation.space().body_count(),
            simulation.space().joint_count()
        );

        Ok(BuiltScene {
            simulation,
            units: self.units,
            bodies,
            names,
        })
    }
}

impl BodyDef {
    pub fn new(name: impl Into<String>, body_type: BodyType, position: Vec2) -> Self {
        Self {
            name: name.into(),
            body_type,
            position,
            ..Default::default()
        }
    }

    /// Mass properties from the shapes if any, otherwise from the raw values
    pub fn mass_properties(&self, units: Units) -> Result<MassProperties> {
        if !self.shapes.is_empty() {
            let parts = self
                .shapes
                .iter()
                .map(|shape| shape.mass_properties(units))
                .collect::<Result<Vec<_>>>()?;
            return MassProperties::combine(&parts);
        }

        if !(self.mass.is_finite() && self.inertia.is_finite()) {
            return Err(PhysicsError::InvalidConfig(format!(
                "body '{}' has a non-finite mass or inertia",
                self.name
            )));
        }

        let centroid = units.vector(self.centroid);
        Ok(MassProperties {
            mass: self.mass,
            inertia: self.inertia + self.mass * centroid.length_squared(),
            centroid,
        })
    }

    fn to_body(&self, units: Units) -> Result<Body> {
        let properties = self.mass_properties(units)?;

        let mut body = Body::new(self.body_type, Vec2::ZERO)
            .with_name(self.name.clone())
            .with_mass_properties(properties)
            .with_fixed_rotation(self.fixed_rotation)
            .with_damping(self.linear_damping, self.angular_damping);

        body.set_transform(units.vector(self.position), self.angle);
        body.velocity = units.vector(self.velocity);
        body.angular_velocity = self.angular_velocity;
        Ok(body)
    }
}

impl ShapeDef {
    /// Mass properties about the body origin
    pub fn mass_properties(&self, units: Units) -> Result<MassProperties> {
        match self {
            Self::Circle {
                center,
                radius,
                inner_radius,
                density,
            } => MassProperties::circle(
                *density,
                units.length(*radius),
                units.length(*inner_radius),
                units.vector(*center),
            ),
            Self::Segment {
                a,
                b,
                radius,
                density,
            } => MassProperties::segment(
                *density,
                units.vector(*a),
                units.vector(*b),
                units.length(*radius),
            ),
            Self::Poly { verts, density } => {
                let verts: Vec<Vec2> = verts.iter().map(|v| units.vector(*v)).collect();
                MassProperties::polygon(*density, &verts)
            }
            Self::Cuboid {
                width,
                height,
                density,
            } => MassProperties::cuboid(*density, units.length(*width), units.length(*height)),
        }
    }
}

impl JointDef {
    fn add_to(
        &self,
        space: &mut Space,
        body1: BodyHandle,
        body2: BodyHandle,
        units: Units,
    ) -> Result<()> {
        match &self.kind {
            JointKindDef::Revolute {
                anchor,
                limit,
                motor,
            } => {
                let mut joint = RevoluteJoint::new(space, body1, body2, units.vector(*anchor))?;
                if let Some(limit) = limit {
                    joint = joint.with_limits(limit.lower, limit.upper);
                }
                if let Some(motor) = motor {
                    joint = joint.with_motor(motor.speed, motor.max_torque);
                }
                space.add_joint(self.configure(joint))?;
            }
            JointKindDef::Distance {
                anchor1,
                anchor2,
                frequency_hz,
                damping_ratio,
                rest_length,
            } => {
                let mut joint = DistanceJoint::new(
                    space,
                    body1,
                    body2,
                    units.vector(*anchor1),
                    units.vector(*anchor2),
                )?
                .with_spring(*frequency_hz, *damping_ratio);
                if let Some(length) = rest_length {
                    joint = joint.with_rest_length(units.length(*length));
                }
                space.add_joint(self.configure(joint))?;
            }
            JointKindDef::Rope {
                anchor1,
                anchor2,
                min_length,
                max_length,
            } => {
                let mut joint = RopeJoint::new(
                    space,
                    body1,
                    body2,
                    units.vector(*anchor1),
                    units.vector(*anchor2),
                )?;
                let max_length = max_length.map_or(joint.max_length(), |l| units.length(l));
                joint = joint.with_range(units.length(*min_length), max_length);
                space.add_joint(self.configure(joint))?;
            }
            JointKindDef::Weld {
                anchor,
                frequency_hz,
                damping_ratio,
            } => {
                let joint = WeldJoint::new(space, body1, body2, units.vector(*anchor))?
                    .with_spring(*frequency_hz, *damping_ratio);
                space.add_joint(self.configure(joint))?;
            }
            JointKindDef::Spring {
                anchor1,
                anchor2,
                stiffness,
                damping,
                rest_length,
            } => {
                let mut joint = SpringJoint::new(
                    space,
                    body1,
                    body2,
                    units.vector(*anchor1),
                    units.vector(*anchor2),
                )?
                .with_spring(*stiffness, *damping);
                if let Some(length) = rest_length {
                    joint = joint.with_rest_length(units.length(*length));
                }
                space.add_joint(self.configure(joint))?;
            }
            JointKindDef::Angle => {
                let joint = AngleJoint::new(space, body1, body2)?;
                space.add_joint(self.configure(joint))?;
            }
        }
        Ok(())
    }

    fn configure<J: Joint>(&self, mut joint: J) -> J {
        let base = joint.base_mut();
        base.collide_connected = self.collide_connected;
        base.breakable = self.breakable;
        if let Some(max_force) = self.max_force {
            base.max_force = max_force;
        }
        joint
    }
}

impl BuiltScene {
    pub fn body(&self, name: &str) -> Option<BodyHandle> {
        self.names.get(name).copied()
    }

    /// Current state of every body, in scene order and scene units
    pub fn snapshot(&self) -> Vec<BodyState> {
        let space = self.simulation.space();
        self.bodies
            .iter()
            .filter_map(|(name, handle)| {
                let body = space.body(*handle)?;
                Some(BodyState {
                    name: name.clone(),
                    position: self.units.vector_out(body.origin()),
                    angle: body.angle,
                    velocity: self.units.vector_out(body.velocity),
                    angular_velocity: body.angular_velocity,
                })
            })
            .collect()
    }
}
