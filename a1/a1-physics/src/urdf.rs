//! URDF scene description parsing.
//!
//! Produces a plain [`RobotDescription`]; building rigid bodies from it is the
//! job of [`PhysicsWorld`](crate::world::PhysicsWorld).

use nalgebra as na;
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::PhysicsError;

/// Default colour for links without a recognised material (orange).
const DEFAULT_COLOR: [u8; 3] = [200, 100, 50];

#[derive(Clone, Debug)]
pub struct Inertial {
    pub origin: na::Isometry3<f32>,
    pub mass: f32,
    /// Principal moments `[ixx, iyy, izz]`; products of inertia are ignored.
    pub diagonal_inertia: na::Vector3<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Geometry {
    Box { size: [f32; 3] },
    Sphere { radius: f32 },
    /// Axis along local Z, as in URDF.
    Cylinder { radius: f32, length: f32 },
    /// Meshes are not loaded; a small sphere stands in for them.
    Mesh,
}

#[derive(Clone, Debug)]
pub struct CollisionShape {
    pub origin: na::Isometry3<f32>,
    pub geometry: Geometry,
}

#[derive(Clone, Debug)]
pub struct LinkDescription {
    pub name: String,
    pub inertial: Option<Inertial>,
    pub collisions: Vec<CollisionShape>,
    pub color: [u8; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointKind {
    Fixed,
    Revolute,
    Continuous,
}

impl JointKind {
    pub fn is_actuated(self) -> bool {
        matches!(self, JointKind::Revolute | JointKind::Continuous)
    }
}

#[derive(Clone, Debug)]
pub struct JointDescription {
    pub name: String,
    pub kind: JointKind,
    pub parent: String,
    pub child: String,
    /// Child frame relative to the parent frame at zero joint angle.
    pub origin: na::Isometry3<f32>,
    /// Rotation axis in the joint (child) frame.
    pub axis: na::Unit<na::Vector3<f32>>,
    pub limit: Option<[f32; 2]>,
}

#[derive(Clone, Debug)]
pub struct RobotDescription {
    pub name: String,
    pub root: String,
    pub links: Vec<LinkDescription>,
    /// Joints in document order.
    pub joints: Vec<JointDescription>,
}

impl RobotDescription {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PhysicsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PhysicsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(urdf_content: &str) -> Result<Self, PhysicsError> {
        let doc = Document::parse(urdf_content)?;
        let robot = doc.root_element();
        if !robot.has_tag_name("robot") {
            return Err(PhysicsError::NotARobot);
        }
        let name = robot.attribute("name").unwrap_or("robot").to_string();

        // 1. Materials declared at document level, referenced by name from links
        let mut materials = HashMap::new();
        for node in robot.children().filter(|n| n.has_tag_name("material")) {
            if let (Some(name), Some(color)) = (node.attribute("name"), material_color(node)?) {
                materials.insert(name.to_string(), color);
            }
        }

        // 2. Links
        let mut links = Vec::new();
        for node in robot.children().filter(|n| n.has_tag_name("link")) {
            links.push(parse_link(node, &materials)?);
        }

        // 3. Joints
        let link_names: HashSet<&str> = links.iter().map(|l| l.name.as_str()).collect();
        let mut joints = Vec::new();
        for node in robot.children().filter(|n| n.has_tag_name("joint")) {
            let joint = parse_joint(node)?;
            for link in [&joint.parent, &joint.child] {
                if !link_names.contains(link.as_str()) {
                    return Err(PhysicsError::UnknownLink {
                        joint: joint.name.clone(),
                        link: link.clone(),
                    });
                }
            }
            joints.push(joint);
        }

        // 4. Each link has at most one parent, so the links form a tree
        let mut parent_of: HashMap<&str, &str> = HashMap::new();
        for joint in &joints {
            if let Some(first) = parent_of.insert(joint.child.as_str(), joint.name.as_str()) {
                return Err(PhysicsError::MultipleParents {
                    link: joint.child.clone(),
                    first: first.to_string(),
                    second: joint.name.clone(),
                });
            }
        }

        // 5. Root = the only link that is nobody's child
        let roots: Vec<&str> = links
            .iter()
            .map(|l| l.name.as_str())
            .filter(|name| !parent_of.contains_key(name))
            .collect();
        let root = match roots.as_slice() {
            [] => return Err(PhysicsError::MissingRoot),
            [root] => root.to_string(),
            many => {
                return Err(PhysicsError::InvalidValue {
                    what: "root link (URDF must describe a single tree)".to_string(),
                    value: many.join(", "),
                })
            }
        };

        log::debug!(
            "parsed URDF `{}`: {} links, {} joints, root `{}`",
            name,
            links.len(),
            joints.len(),
            root
        );

        Ok(Self {
            name,
            root,
            links,
            joints,
        })
    }

    pub fn link(&self, name: &str) -> Option<&LinkDescription> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Revolute and continuous joints, in document order.
    pub fn actuated_joints(&self) -> impl Iterator<Item = &JointDescription> {
        self.joints.iter().filter(|j| j.kind.is_actuated())
    }

    pub fn child_joints<'a>(&'a self, link: &'a str) -> impl Iterator<Item = &'a JointDescription> {
        self.joints.iter().filter(move |j| j.parent == link)
    }
}

fn parse_link(
    node: Node,
    materials: &HashMap<String, [u8; 3]>,
) -> Result<LinkDescription, PhysicsError> {
    let name = required_attribute(node, "link", "name")?.to_string();

    let inertial = match node.children().find(|n| n.has_tag_name("inertial")) {
        Some(inertial) => Some(parse_inertial(inertial)?),
        None => None,
    };

    let mut collisions = Vec::new();
    for collision in node.children().filter(|n| n.has_tag_name("collision")) {
        let origin = parse_origin(collision.children().find(|n| n.has_tag_name("origin")))?;
        if let Some(geometry) = collision.children().find(|n| n.has_tag_name("geometry")) {
            collisions.push(CollisionShape {
                origin,
                geometry: parse_geometry(geometry)?,
            });
        }
    }

    let color = node
        .children()
        .find(|n| n.has_tag_name("visual"))
        .and_then(|visual| visual.children().find(|n| n.has_tag_name("material")))
        .map(|material| resolve_material(material, materials))
        .transpose()?
        .unwrap_or(DEFAULT_COLOR);

    Ok(LinkDescription {
        name,
        inertial,
        collisions,
        color,
    })
}

fn parse_inertial(node: Node) -> Result<Inertial, PhysicsError> {
    let origin = parse_origin(node.children().find(|n| n.has_tag_name("origin")))?;

    let mass_node = node
        .children()
        .find(|n| n.has_tag_name("mass"))
        .ok_or(PhysicsError::MissingAttribute {
            element: "inertial",
            attribute: "mass",
        })?;
    let mass = parse_f32(required_attribute(mass_node, "mass", "value")?, "mass")?;

    let mut diagonal_inertia = na::Vector3::zeros();
    if let Some(inertia) = node.children().find(|n| n.has_tag_name("inertia")) {
        for (i, key) in ["ixx", "iyy", "izz"].into_iter().enumerate() {
            if let Some(value) = inertia.attribute(key) {
                diagonal_inertia[i] = parse_f32(value, key)?;
            }
        }
    }

    Ok(Inertial {
        origin,
        mass,
        diagonal_inertia,
    })
}

fn parse_geometry(node: Node) -> Result<Geometry, PhysicsError> {
    if let Some(b) = node.children().find(|n| n.has_tag_name("box")) {
        let v = parse_floats(required_attribute(b, "box", "size")?, "box size")?;
        if let [x, y, z] = v[..] {
            return Ok(Geometry::Box { size: [x, y, z] });
        }
        return Err(PhysicsError::InvalidValue {
            what: "box size".to_string(),
            value: format!("{v:?}"),
        });
    }
    if let Some(s) = node.children().find(|n| n.has_tag_name("sphere")) {
        let radius = parse_f32(required_attribute(s, "sphere", "radius")?, "sphere radius")?;
        return Ok(Geometry::Sphere { radius });
    }
    if let Some(c) = node.children().find(|n| n.has_tag_name("cylinder")) {
        let radius = parse_f32(required_attribute(c, "cylinder", "radius")?, "cylinder radius")?;
        let length = parse_f32(required_attribute(c, "cylinder", "length")?, "cylinder length")?;
        return Ok(Geometry::Cylinder { radius, length });
    }
    if node.children().any(|n| n.has_tag_name("mesh")) {
        return Ok(Geometry::Mesh);
    }
    Err(PhysicsError::InvalidValue {
        what: "geometry".to_string(),
        value: node
            .children()
            .filter(|n| n.is_element())
            .map(|n| n.tag_name().name())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Inline `<color rgba>` of a `<material>` element.
fn material_color(node: Node) -> Result<Option<[u8; 3]>, PhysicsError> {
    let Some(rgba) = node
        .children()
        .find(|n| n.has_tag_name("color"))
        .and_then(|c| c.attribute("rgba"))
    else {
        return Ok(None);
    };
    let v = parse_floats(rgba, "material rgba")?;
    if v.len() < 3 {
        return Err(PhysicsError::InvalidValue {
            what: "material rgba".to_string(),
            value: rgba.to_string(),
        });
    }
    let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    Ok(Some([to_byte(v[0]), to_byte(v[1]), to_byte(v[2])]))
}

/// Inline colour, then a document-level material of the same name, then a
/// small palette of common names.
fn resolve_material(
    node: Node,
    materials: &HashMap<String, [u8; 3]>,
) -> Result<[u8; 3], PhysicsError> {
    if let Some(color) = material_color(node)? {
        return Ok(color);
    }
    if let Some(color) = node.attribute("name").and_then(|name| materials.get(name)) {
        return Ok(*color);
    }

    let color = match node.attribute("name").map(str::to_lowercase).as_deref() {
        Some("black") => [25, 25, 25],
        Some("white") | Some("grey") | Some("gray") => [200, 200, 200],
        Some("orange") => [255, 128, 0],
        _ => DEFAULT_COLOR,
    };
    Ok(color)
}

fn parse_joint(node: Node) -> Result<JointDescription, PhysicsError> {
    let name = required_attribute(node, "joint", "name")?.to_string();
    let kind = match required_attribute(node, "joint", "type")? {
        "fixed" => JointKind::Fixed,
        "revolute" => JointKind::Revolute,
        "continuous" => JointKind::Continuous,
        other => {
            return Err(PhysicsError::InvalidValue {
                what: format!("type of joint `{name}`"),
                value: other.to_string(),
            })
        }
    };

    let link_of = |tag: &'static str| -> Result<String, PhysicsError> {
        let child = node
            .children()
            .find(|n| n.has_tag_name(tag))
            .ok_or(PhysicsError::MissingAttribute {
                element: "joint",
                attribute: tag,
            })?;
        Ok(required_attribute(child, tag, "link")?.to_string())
    };
    let parent = link_of("parent")?;
    let child = link_of("child")?;

    let origin = parse_origin(node.children().find(|n| n.has_tag_name("origin")))?;

    let mut axis = na::Vector3::x();
    if let Some(xyz) = node
        .children()
        .find(|n| n.has_tag_name("axis"))
        .and_then(|n| n.attribute("xyz"))
    {
        axis = parse_vec3(xyz, "joint axis")?;
    }
    let axis = na::Unit::try_new(axis, 1.0e-6).ok_or_else(|| PhysicsError::InvalidValue {
        what: format!("axis of joint `{name}`"),
        value: format!("{axis:?}"),
    })?;

    let limit = match (kind, node.children().find(|n| n.has_tag_name("limit"))) {
        (JointKind::Revolute, Some(limit)) => {
            let lower = limit.attribute("lower").map(|v| parse_f32(v, "lower limit"));
            let upper = limit.attribute("upper").map(|v| parse_f32(v, "upper limit"));
            match (lower, upper) {
                (Some(lower), Some(upper)) => Some([lower?, upper?]),
                _ => None,
            }
        }
        _ => None,
    };

    Ok(JointDescription {
        name,
        kind,
        parent,
        child,
        origin,
        axis,
        limit,
    })
}

fn parse_origin(node: Option<Node>) -> Result<na::Isometry3<f32>, PhysicsError> {
    let mut xyz = na::Vector3::zeros();
    let mut rpy = na::Vector3::zeros();

    if let Some(origin) = node {
        if let Some(xyz_str) = origin.attribute("xyz") {
            xyz = parse_vec3(xyz_str, "origin xyz")?;
        }
        if let Some(rpy_str) = origin.attribute("rpy") {
            rpy = parse_vec3(rpy_str, "origin rpy")?;
        }
    }

    Ok(na::Isometry3::from_parts(
        na::Translation3::from(xyz),
        na::UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z),
    ))
}

fn required_attribute<'a>(
    node: Node<'a, '_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<&'a str, PhysicsError> {
    node.attribute(attribute)
        .ok_or(PhysicsError::MissingAttribute { element, attribute })
}

fn parse_f32(value: &str, what: &str) -> Result<f32, PhysicsError> {
    value.trim().parse().map_err(|_| PhysicsError::InvalidValue {
        what: what.to_string(),
        value: value.to_string(),
    })
}

fn parse_floats(value: &str, what: &str) -> Result<Vec<f32>, PhysicsError> {
    value.split_whitespace().map(|s| parse_f32(s, what)).collect()
}

fn parse_vec3(value: &str, what: &str) -> Result<na::Vector3<f32>, PhysicsError> {
    match parse_floats(value, what)?[..] {
        [x, y, z] => Ok(na::Vector3::new(x, y, z)),
        _ => Err(PhysicsError::InvalidValue {
            what: what.to_string(),
            value: value.to_string(),
        }),
    }
}
