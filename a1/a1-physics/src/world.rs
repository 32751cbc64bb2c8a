use nalgebra as na;
use rapier3d::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::path::Path;

use crate::backend::{PrimitiveShape, ScenePrimitive, SimulationBackend};
use crate::config::PhysicsConfig;
use crate::error::PhysicsError;
use crate::state::{SimulationState, BASE_NQ, BASE_NV};
use crate::urdf::{Geometry, JointKind, RobotDescription};

/// Stand-in radius for mesh collision geometry.
const MESH_FALLBACK_RADIUS: f32 = 0.02;
/// Mass given to links that declare neither inertia nor collision geometry.
const MASSLESS_LINK_MASS: f32 = 1.0e-3;

/// Parent/child pair in the kinematic tree, stored in breadth-first order.
struct TreeEdge {
    parent: RigidBodyHandle,
    child: RigidBodyHandle,
    /// Child frame in the parent frame at zero joint angle.
    origin: Isometry<f32>,
    /// Rotation axis in the child frame.
    axis: na::Unit<na::Vector3<f32>>,
    /// Index into the joint coordinates; `None` for fixed joints.
    actuator: Option<usize>,
}

struct LinkGeometry {
    body: RigidBodyHandle,
    local: Isometry<f32>,
    shape: PrimitiveShape,
    color: [u8; 3],
}

/// Rapier world holding one floating-base robot and a flat ground at `z = 0`.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub gravity: Vector<f32>,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    // Map link names to RigidBodyHandles for rendering sync
    pub link_map: HashMap<String, RigidBodyHandle>,

    base: RigidBodyHandle,
    edges: Vec<TreeEdge>,
    joint_names: Vec<String>,
    /// Centre of mass of each link in its own frame.
    local_com: HashMap<RigidBodyHandle, na::Vector3<f32>>,
    geometry: Vec<LinkGeometry>,
    state: SimulationState,
}

impl PhysicsWorld {
    pub fn from_urdf_file(
        path: impl AsRef<Path>,
        config: &PhysicsConfig,
    ) -> Result<Self, PhysicsError> {
        let robot = RobotDescription::from_file(path)?;
        Self::from_description(&robot, config)
    }

    pub fn from_description(
        robot: &RobotDescription,
        config: &PhysicsConfig,
    ) -> Result<Self, PhysicsError> {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.timestep;
        integration_parameters.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN);

        let [gx, gy, gz] = config.gravity;
        let mut world = Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            gravity: vector![gx, gy, gz],
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            link_map: HashMap::new(),
            base: RigidBodyHandle::invalid(),
            edges: Vec::new(),
            joint_names: Vec::new(),
            local_com: HashMap::new(),
            geometry: Vec::new(),
            state: SimulationState::zeros(BASE_NQ, BASE_NV, 0),
        };

        // 1. Ground: top face at z = 0. Robot = Group 2, ground = Group 1, no self-collision.
        let ground = ColliderBuilder::cuboid(50.0, 50.0, 0.1)
            .translation(vector![0.0, 0.0, -0.1])
            .friction(config.friction)
            .collision_groups(InteractionGroups::new(Group::GROUP_1, Group::ALL))
            .build();
        world.collider_set.insert(ground);

        // 2. Links, breadth-first from the root at zero joint angles
        let actuator_index: HashMap<&str, usize> = robot
            .actuated_joints()
            .enumerate()
            .map(|(i, joint)| (joint.name.as_str(), i))
            .collect();
        world.joint_names = robot.actuated_joints().map(|j| j.name.clone()).collect();

        let mut queue = VecDeque::new();
        queue.push_back((robot.root.as_str(), Isometry::identity()));
        world.base = world.insert_link(robot, &robot.root, Isometry::identity(), config)?;

        while let Some((parent_name, parent_pose)) = queue.pop_front() {
            let parent = world.link_map[parent_name];
            for joint in robot.child_joints(parent_name) {
                if world.link_map.contains_key(&joint.child) {
                    return Err(PhysicsError::InvalidValue {
                        what: format!("child of joint `{}` (link already in the tree)", joint.name),
                        value: joint.child.clone(),
                    });
                }
                let child_pose = parent_pose * joint.origin;
                let child = world.insert_link(robot, &joint.child, child_pose, config)?;

                // 3. Joint between parent and child
                let actuator = actuator_index.get(joint.name.as_str()).copied();
                match joint.kind {
                    JointKind::Fixed => {
                        let fixed = FixedJointBuilder::new()
                            .local_frame1(joint.origin)
                            .local_frame2(Isometry::identity())
                            .build();
                        world.impulse_joint_set.insert(parent, child, fixed, true);
                    }
                    JointKind::Revolute | JointKind::Continuous => {
                        // Joint frames have their X axis on the rotation axis, so the
                        // solver's joint angle matches the one read back in `sync_state`.
                        let align = Isometry::from_parts(
                            na::Translation3::identity(),
                            axis_alignment(&joint.axis),
                        );
                        let mut builder = GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
                            .local_frame1(joint.origin * align)
                            .local_frame2(align);
                        if let Some(limit) = joint.limit {
                            builder = builder.limits(JointAxis::AngX, limit);
                        }
                        world.impulse_joint_set.insert(parent, child, builder.build(), true);
                    }
                }

                world.edges.push(TreeEdge {
                    parent,
                    child,
                    origin: joint.origin,
                    axis: joint.axis,
                    actuator,
                });
                queue.push_back((joint.child.as_str(), child_pose));
            }
        }

        let nu = world.joint_names.len();
        world.state = SimulationState::zeros(BASE_NQ + nu, BASE_NV + nu, nu);
        world.sync_state();

        log::info!(
            "built physics world for `{}`: {} bodies, {} actuated joints, dt={}",
            robot.name,
            world.rigid_body_set.len(),
            nu,
            config.timestep
        );
        Ok(world)
    }

    fn insert_link(
        &mut self,
        robot: &RobotDescription,
        name: &str,
        pose: Isometry<f32>,
        config: &PhysicsConfig,
    ) -> Result<RigidBodyHandle, PhysicsError> {
        let link = robot.link(name).ok_or_else(|| PhysicsError::UnknownLink {
            joint: "<tree>".to_string(),
            link: name.to_string(),
        })?;

        let mut rb = RigidBodyBuilder::dynamic()
            .position(pose)
            .linear_damping(config.linear_damping)
            .angular_damping(config.angular_damping)
            .can_sleep(false);
        let mut local_com = na::Vector3::zeros();
        if let Some(inertial) = &link.inertial {
            local_com = inertial.origin.translation.vector;
            rb = rb.additional_mass_properties(MassProperties::new(
                Point::from(local_com),
                inertial.mass,
                inertial.diagonal_inertia,
            ));
        } else if link.collisions.is_empty() {
            log::debug!("link `{}` has no mass, giving it {} kg", name, MASSLESS_LINK_MASS);
            rb = rb.additional_mass(MASSLESS_LINK_MASS);
        }
        let handle = self.rigid_body_set.insert(rb.build());
        self.link_map.insert(name.to_string(), handle);
        self.local_com.insert(handle, local_com);

        // Declared inertia wins; otherwise colliders carry the mass.
        let density = if link.inertial.is_some() {
            0.0
        } else {
            config.fallback_density
        };

        for collision in &link.collisions {
            let (builder, local, shape) = match collision.geometry {
                Geometry::Box { size } => {
                    let half = [size[0] / 2.0, size[1] / 2.0, size[2] / 2.0];
                    (
                        ColliderBuilder::cuboid(half[0], half[1], half[2]),
                        collision.origin,
                        PrimitiveShape::Cuboid { half_extents: half },
                    )
                }
                Geometry::Sphere { radius } => (
                    ColliderBuilder::ball(radius),
                    collision.origin,
                    PrimitiveShape::Sphere { radius },
                ),
                Geometry::Cylinder { radius, length } => {
                    // Rapier cylinders run along Y, URDF cylinders along Z.
                    let to_z = Isometry::rotation(na::Vector3::x() * std::f32::consts::FRAC_PI_2);
                    (
                        ColliderBuilder::cylinder(length / 2.0, radius),
                        collision.origin * to_z,
                        PrimitiveShape::Cuboid {
                            half_extents: [radius, radius, length / 2.0],
                        },
                    )
                }
                Geometry::Mesh => (
                    ColliderBuilder::ball(MESH_FALLBACK_RADIUS),
                    collision.origin,
                    PrimitiveShape::Sphere {
                        radius: MESH_FALLBACK_RADIUS,
                    },
                ),
            };

            let collider = builder
                .position(local)
                .density(density)
                .friction(config.friction)
                .collision_groups(InteractionGroups::new(Group::GROUP_2, Group::GROUP_1))
                .build();
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);

            self.geometry.push(LinkGeometry {
                body: handle,
                local: collision.origin,
                shape,
                color: link.color,
            });
        }

        Ok(handle)
    }

    /// Names of the actuated joints, in joint-coordinate order.
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn get_body_pose(&self, handle: RigidBodyHandle) -> Option<Isometry<f32>> {
        self.rigid_body_set.get(handle).map(|body| *body.position())
    }

    fn clear_forces(&mut self) {
        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }
    }

    /// Applies each actuator input as equal and opposite torques about the
    /// current world-space joint axis.
    fn apply_joint_torques(&mut self) {
        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_torques(false);
        }

        for edge in &self.edges {
            let Some(k) = edge.actuator else { continue };
            let tau = self.state.ctrl[k];
            if tau == 0.0 {
                continue;
            }
            let axis_world = {
                let parent = &self.rigid_body_set[edge.parent];
                (parent.rotation() * edge.origin.rotation) * edge.axis.into_inner()
            };
            if let Some(child) = self.rigid_body_set.get_mut(edge.child) {
                child.add_torque(axis_world * tau, true);
            }
            if let Some(parent) = self.rigid_body_set.get_mut(edge.parent) {
                parent.add_torque(-axis_world * tau, true);
            }
        }
    }

    /// Re-derives generalized coordinates from the rigid body states.
    fn sync_state(&mut self) {
        let base = &self.rigid_body_set[self.base];
        let t = base.translation();
        let r = base.rotation();
        // Rapier tracks the centre of mass; qvel holds the base frame origin
        let com = r * self.local_com[&self.base];
        let v = base.linvel() - base.angvel().cross(&com);
        let w_local = r.inverse() * base.angvel();

        let qpos = &mut self.state.qpos;
        qpos[..3].copy_from_slice(&[t.x, t.y, t.z]);
        qpos[3..BASE_NQ].copy_from_slice(&[r.w, r.i, r.j, r.k]);
        let qvel = &mut self.state.qvel;
        qvel[..3].copy_from_slice(&[v.x, v.y, v.z]);
        qvel[3..BASE_NV].copy_from_slice(&[w_local.x, w_local.y, w_local.z]);

        for edge in &self.edges {
            let Some(k) = edge.actuator else { continue };
            let parent = &self.rigid_body_set[edge.parent];
            let child = &self.rigid_body_set[edge.child];

            let joint_rotation = parent.rotation() * edge.origin.rotation;
            let relative = joint_rotation.inverse() * child.rotation();
            let axis_world = joint_rotation * edge.axis.into_inner();

            self.state.qpos[BASE_NQ + k] = twist_angle(&relative, &edge.axis);
            self.state.qvel[BASE_NV + k] = (child.angvel() - parent.angvel()).dot(&axis_world);
        }
    }
}

impl SimulationBackend for PhysicsWorld {
    fn nq(&self) -> usize {
        self.state.qpos.len()
    }

    fn nv(&self) -> usize {
        self.state.qvel.len()
    }

    fn nu(&self) -> usize {
        self.joint_names.len()
    }

    fn timestep(&self) -> f32 {
        self.integration_parameters.dt
    }

    fn state(&self) -> &SimulationState {
        &self.state
    }

    fn set_ctrl(&mut self, ctrl: &[f32]) -> Result<(), PhysicsError> {
        if ctrl.len() != self.nu() {
            return Err(PhysicsError::StateDimension {
                what: "ctrl",
                expected: self.nu(),
                got: ctrl.len(),
            });
        }
        self.state.ctrl.copy_from_slice(ctrl);
        Ok(())
    }

    fn step(&mut self) {
        self.apply_joint_torques();

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        self.sync_state();
    }

    fn set_state(&mut self, qpos: &[f32], qvel: &[f32]) -> Result<(), PhysicsError> {
        if qpos.len() != self.nq() {
            return Err(PhysicsError::StateDimension {
                what: "qpos",
                expected: self.nq(),
                got: qpos.len(),
            });
        }
        if qvel.len() != self.nv() {
            return Err(PhysicsError::StateDimension {
                what: "qvel",
                expected: self.nv(),
                got: qvel.len(),
            });
        }

        // 1. Base pose and velocity
        let quat = na::Quaternion::new(qpos[3], qpos[4], qpos[5], qpos[6]);
        let rotation = if quat.norm() > f32::EPSILON {
            na::UnitQuaternion::from_quaternion(quat)
        } else {
            na::UnitQuaternion::identity()
        };
        let base_pose = Isometry::from_parts(
            na::Translation3::new(qpos[0], qpos[1], qpos[2]),
            rotation,
        );
        let base_omega = rotation * vector![qvel[3], qvel[4], qvel[5]];
        let base_com = base_pose.rotation * self.local_com[&self.base];
        let base_origin_velocity = vector![qvel[0], qvel[1], qvel[2]] - base_omega.cross(&base_com);

        // Pose, angular velocity and frame-origin velocity of every placed link
        let mut placed: HashMap<RigidBodyHandle, (Isometry<f32>, Vector<f32>, Vector<f32>)> =
            HashMap::new();
        placed.insert(self.base, (base_pose, base_omega, base_origin_velocity));

        // 2. Walk the tree; edges are stored parent-before-child
        for edge in &self.edges {
            let (angle, rate) = match edge.actuator {
                Some(k) => (qpos[BASE_NQ + k], qvel[BASE_NV + k]),
                None => (0.0, 0.0),
            };
            let (parent_pose, parent_omega, parent_velocity) = placed[&edge.parent];

            let joint_frame = parent_pose * edge.origin;
            let child_pose = joint_frame * na::UnitQuaternion::from_axis_angle(&edge.axis, angle);
            let axis_world = joint_frame.rotation * edge.axis.into_inner();
            let omega = parent_omega + axis_world * rate;
            let lever = child_pose.translation.vector - parent_pose.translation.vector;
            let velocity = parent_velocity + parent_omega.cross(&lever);

            placed.insert(edge.child, (child_pose, omega, velocity));
        }

        // 3. Write bodies; rapier velocities are centre-of-mass velocities
        for (handle, (pose, omega, origin_velocity)) in placed {
            let com = pose.rotation * self.local_com[&handle];
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.set_position(pose, true);
                body.set_angvel(omega, true);
                body.set_linvel(origin_velocity + omega.cross(&com), true);
            }
        }

        self.state.qpos.copy_from_slice(qpos);
        self.state.qvel.copy_from_slice(qvel);
        self.state.ctrl.iter_mut().for_each(|c| *c = 0.0);
        Ok(())
    }

    fn forward(&mut self) {
        self.clear_forces();
        self.sync_state();
    }

    fn scene(&self) -> Vec<ScenePrimitive> {
        self.geometry
            .iter()
            .filter_map(|g| {
                let body = self.rigid_body_set.get(g.body)?;
                Some(ScenePrimitive {
                    shape: g.shape,
                    pose: body.position() * g.local,
                    color: g.color,
                })
            })
            .collect()
    }
}

/// Rotation taking the X axis onto `axis`.
fn axis_alignment(axis: &na::Unit<na::Vector3<f32>>) -> na::UnitQuaternion<f32> {
    na::UnitQuaternion::rotation_between_axis(&na::Vector3::x_axis(), axis).unwrap_or_else(|| {
        // Antiparallel: any half turn about an axis orthogonal to X
        na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), std::f32::consts::PI)
    })
}

/// Signed rotation of `q` about `axis` (swing-twist decomposition), in `(-pi, pi]`.
fn twist_angle(q: &na::UnitQuaternion<f32>, axis: &na::Unit<na::Vector3<f32>>) -> f32 {
    use std::f32::consts::{PI, TAU};

    let projection = q.imag().dot(&axis.into_inner());
    let mut angle = 2.0 * projection.atan2(q.w);
    if angle > PI {
        angle -= TAU;
    } else if angle <= -PI {
        angle += TAU;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    const A1_URDF: &str = include_str!("../../assets/a1.urdf");

    fn a1_world() -> PhysicsWorld {
        let robot = RobotDescription::parse(A1_URDF).unwrap();
        PhysicsWorld::from_description(&robot, &PhysicsConfig::default()).unwrap()
    }

    fn standing_pose() -> Vec<f32> {
        [0.2, -0.9, 1.5].repeat(4)
    }

    #[test]
    fn twist_angle_recovers_axis_rotation() {
        let axis = na::Vector3::y_axis();
        for angle in [-2.5_f32, -0.9, 0.0, 0.3, 1.5, 3.0] {
            let q = na::UnitQuaternion::from_axis_angle(&axis, angle);
            assert!((twist_angle(&q, &axis) - angle).abs() < 1e-5, "angle {angle}");
        }
    }

    #[test]
    fn twist_ignores_swing() {
        let axis = na::Vector3::x_axis();
        let twist = na::UnitQuaternion::from_axis_angle(&axis, 0.4);
        let swing = na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), 0.2);
        let angle = twist_angle(&(swing * twist), &axis);
        assert!((angle - 0.4).abs() < 0.05);
    }

    #[test]
    fn loop_in_description_is_rejected() {
        let mut robot = RobotDescription::parse(A1_URDF).unwrap();
        let mut back_edge = robot.joints[0].clone();
        back_edge.name = "FR_loop".to_string();
        back_edge.parent = "FR_calf".to_string();
        back_edge.child = "trunk".to_string();
        robot.joints.push(back_edge);

        let result = PhysicsWorld::from_description(&robot, &PhysicsConfig::default());
        assert!(matches!(
            result,
            Err(PhysicsError::InvalidValue { ref value, .. }) if value == "trunk"
        ));
    }

    #[test]
    fn a1_dimensions() {
        let world = a1_world();
        assert_eq!(world.nu(), 12);
        assert_eq!(world.nq(), 19);
        assert_eq!(world.nv(), 18);
        assert_eq!(world.joint_names()[0], "FR_hip_joint");
        assert!(world.link_map.contains_key("trunk"));
        assert!(world.timestep() > 0.0);
    }

    #[test]
    fn set_state_then_forward_round_trips() {
        let mut world = a1_world();
        let state = SimulationState::standing(19, 18, 0.3, &standing_pose()).unwrap();
        world.set_state(&state.qpos, &state.qvel).unwrap();
        world.forward();

        let read = world.state();
        assert_eq!(read.base_height(), 0.3);
        assert_eq!(read.base_orientation(), [1.0, 0.0, 0.0, 0.0]);
        assert!(read.qvel.iter().all(|&v| v == 0.0));
        for (got, want) in read.joint_positions().iter().zip(standing_pose()) {
            assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        }
        assert!(read.ctrl.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn base_velocity_round_trips_with_offset_com() {
        let urdf = r#"
            <robot name="brick">
              <link name="body">
                <inertial>
                  <origin xyz="0.1 0.05 0"/>
                  <mass value="1.0"/>
                  <inertia ixx="0.01" iyy="0.01" izz="0.01"/>
                </inertial>
                <collision><geometry><box size="0.2 0.1 0.1"/></geometry></collision>
              </link>
            </robot>
        "#;
        let robot = RobotDescription::parse(urdf).unwrap();
        let mut world = PhysicsWorld::from_description(&robot, &PhysicsConfig::default()).unwrap();

        let qpos = [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let qvel = [0.3, -0.2, 0.1, 0.5, -0.4, 2.0];
        world.set_state(&qpos, &qvel).unwrap();
        world.forward();

        for (got, want) in world.state().qvel.iter().zip(qvel) {
            assert!((got - want).abs() < 1e-5, "{got} vs {want}");
        }
    }

    #[test]
    fn set_state_rejects_wrong_lengths() {
        let mut world = a1_world();
        assert!(matches!(
            world.set_state(&[0.0; 18], &[0.0; 18]),
            Err(PhysicsError::StateDimension { what: "qpos", .. })
        ));
        assert!(matches!(
            world.set_state(&[0.0; 19], &[0.0; 17]),
            Err(PhysicsError::StateDimension { what: "qvel", .. })
        ));
        assert!(world.set_ctrl(&[0.0; 3]).is_err());
    }

    #[test]
    fn joint_torque_moves_joint() {
        let mut world = a1_world();
        // Lifted clear of the ground so the leg swings freely
        let state = SimulationState::standing(19, 18, 1.0, &standing_pose()).unwrap();
        world.set_state(&state.qpos, &state.qvel).unwrap();
        world.forward();

        let mut ctrl = vec![0.0; 12];
        ctrl[1] = 2.0;
        world.set_ctrl(&ctrl).unwrap();
        world.step();

        assert!(world.state().joint_velocities()[1] > 0.0);
        assert_eq!(world.state().ctrl[1], 2.0);
    }

    #[test]
    fn scene_lists_collision_shapes() {
        let world = a1_world();
        let scene = world.scene();
        assert!(!scene.is_empty());
        assert!(scene
            .iter()
            .any(|p| matches!(p.shape, PrimitiveShape::Sphere { .. })));
    }
}
