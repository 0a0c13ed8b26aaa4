//! Built-in demo scenes

use clap::ValueEnum;
use tether_core::math::Vec2;
use tether_physics::{
    AngleLimit, BodyDef, BodyType, JointDef, JointKindDef, MotorDef, SceneDef, ShapeDef,
    SimulationConfig, SpaceConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Single bob on a pin
    Pendulum,
    /// Ten links hanging from a static anchor
    Chain,
    /// Wheel spun up by a torque-limited motor
    Motor,
    /// Motor driving an arm into its angle limits
    Limit,
    /// Block bouncing on a damped spring with a flag welded on softly
    Spring,
}

impl Demo {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pendulum => "pendulum",
            Self::Chain => "chain",
            Self::Motor => "motor",
            Self::Limit => "limit",
            Self::Spring => "spring",
        }
    }

    pub fn scene(self) -> SceneDef {
        let mut scene = match self {
            Self::Pendulum => pendulum(),
            Self::Chain => chain(10),
            Self::Motor => motor(),
            Self::Limit => limit(),
            Self::Spring => spring(),
        };
        scene.name = Some(self.name().to_string());
        scene
    }
}

fn gravity() -> SpaceConfig {
    SpaceConfig::default().with_gravity(Vec2::new(0.0, -10.0))
}

fn joint(body1: &str, body2: &str, kind: JointKindDef) -> JointDef {
    JointDef {
        body1: body1.to_string(),
        body2: body2.to_string(),
        collide_connected: false,
        max_force: None,
        breakable: false,
        kind,
    }
}

fn revolute(body1: &str, body2: &str, anchor: Vec2) -> JointDef {
    joint(
        body1,
        body2,
        JointKindDef::Revolute {
            anchor,
            limit: None,
            motor: None,
        },
    )
}

fn pendulum() -> SceneDef {
    SceneDef {
        space: gravity(),
        bodies: vec![
            BodyDef::new("pivot", BodyType::Static, Vec2::ZERO),
            BodyDef::new("bob", BodyType::Dynamic, Vec2::new(1.0, 0.0)),
        ],
        joints: vec![revolute("pivot", "bob", Vec2::ZERO)],
        ..Default::default()
    }
}

fn chain(links: usize) -> SceneDef {
    let mut bodies = vec![BodyDef::new("anchor", BodyType::Static, Vec2::ZERO)];
    let mut joints = Vec::with_capacity(links);

    for i in 1..=links {
        let name = format!("link{i}");
        let previous = bodies[i - 1].name.clone();
        bodies.push(BodyDef {
            mass: 0.5,
            inertia: 0.05,
            ..BodyDef::new(name.as_str(), BodyType::Dynamic, Vec2::new(i as f64 * 0.5, 0.0))
        });
        joints.push(revolute(&previous, &name, Vec2::new((i - 1) as f64 * 0.5, 0.0)));
    }

    SceneDef {
        space: gravity(),
        simulation: SimulationConfig {
            velocity_iterations: 10,
            ..Default::default()
        },
        bodies,
        joints,
        ..Default::default()
    }
}

fn motor() -> SceneDef {
    let mut joint = revolute("axle", "wheel", Vec2::ZERO);
    joint.kind = JointKindDef::Revolute {
        anchor: Vec2::ZERO,
        limit: None,
        motor: Some(MotorDef {
            speed: 6.0,
            max_torque: 2.0,
        }),
    };

    SceneDef {
        bodies: vec![
            BodyDef::new("axle", BodyType::Static, Vec2::ZERO),
            BodyDef::new("wheel", BodyType::Dynamic, Vec2::ZERO),
        ],
        joints: vec![joint],
        ..Default::default()
    }
}

fn limit() -> SceneDef {
    let mut joint = revolute("base", "arm", Vec2::ZERO);
    joint.kind = JointKindDef::Revolute {
        anchor: Vec2::ZERO,
        limit: Some(AngleLimit {
            lower: -0.75,
            upper: 0.75,
        }),
        motor: Some(MotorDef {
            speed: 1.5,
            max_torque: 20.0,
        }),
    };

    SceneDef {
        space: gravity(),
        bodies: vec![
            BodyDef::new("base", BodyType::Static, Vec2::ZERO),
            BodyDef::new("arm", BodyType::Dynamic, Vec2::new(1.0, 0.0)),
        ],
        joints: vec![joint],
        ..Default::default()
    }
}

fn spring() -> SceneDef {
    let block = BodyDef {
        shapes: vec![ShapeDef::Cuboid {
            width: 0.5,
            height: 0.5,
            density: 4.0,
        }],
        ..BodyDef::new("block", BodyType::Dynamic, Vec2::new(0.0, -1.5))
    };
    let flag = BodyDef {
        shapes: vec![ShapeDef::Poly {
            verts: vec![Vec2::ZERO, Vec2::new(0.6, 0.15), Vec2::new(0.0, 0.3)],
            density: 1.0,
        }],
        ..BodyDef::new("flag", BodyType::Dynamic, Vec2::new(0.25, -1.4))
    };

    SceneDef {
        space: gravity(),
        bodies: vec![
            BodyDef::new("ceiling", BodyType::Static, Vec2::ZERO),
            block,
            flag,
        ],
        joints: vec![
            joint(
                "ceiling",
                "block",
                JointKindDef::Spring {
                    anchor1: Vec2::ZERO,
                    anchor2: Vec2::new(0.0, -1.25),
                    stiffness: 40.0,
                    damping: 1.0,
                    rest_length: Some(1.0),
                },
            ),
            joint("ceiling", "block", JointKindDef::Angle),
            joint(
                "block",
                "flag",
                JointKindDef::Weld {
                    anchor: Vec2::new(0.25, -1.4),
                    frequency_hz: 2.0,
                    damping_ratio: 0.3,
                },
            ),
        ],
        ..Default::default()
    }
}
