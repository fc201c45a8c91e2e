//! Geometry registry the builders read primitives from.
//!
//! The scene owns all geometry. Leaf records of a built BVH borrow from it,
//! so the scene must outlive every BVH built over it.

mod curves;
mod subdiv_mesh;
mod triangle_mesh;

pub use curves::{BezierCurves, CurveVertex};
pub use subdiv_mesh::{HalfEdge, HalfEdgeIdx, SubdivMesh, VertexFan};
pub use triangle_mesh::TriangleMesh;

#[cfg(test)]
pub(crate) use subdiv_mesh::test as subdiv_mesh_test;

use index_vec::IndexVec;
use thiserror::Error;

index_vec::define_index_type! {
    pub struct GeomId = u32;
    IMPL_RAW_CONVERSIONS = true;
    DEFAULT = GeomId::from_raw_unchecked(0);
}

#[derive(Clone, Debug)]
pub enum Geometry {
    SubdivMesh(SubdivMesh),
    Curves(BezierCurves),
    TriangleMesh(TriangleMesh),
}

impl Geometry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::SubdivMesh(_) => "subdivision mesh",
            Geometry::Curves(_) => "bezier curves",
            Geometry::TriangleMesh(_) => "triangle mesh",
        }
    }

    pub fn primitive_count(&self) -> usize {
        match self {
            Geometry::SubdivMesh(mesh) => mesh.face_count(),
            Geometry::Curves(curves) => curves.curve_count(),
            Geometry::TriangleMesh(mesh) => mesh.triangle_count(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    geometries: IndexVec<GeomId, Geometry>,
}

impl Scene {
    pub fn new() -> Scene {
        Scene::default()
    }

    pub fn add(&mut self, geometry: Geometry) -> GeomId {
        self.geometries.push(geometry)
    }

    /// Total number of primitives over all geometries
    pub fn primitive_count(&self) -> usize {
        self.geometries.iter().map(Geometry::primitive_count).sum()
    }

    pub fn geometries(&self) -> impl Iterator<Item = (GeomId, &Geometry)> {
        self.geometries.iter_enumerated()
    }

    pub fn resolve(&self, geom_id: GeomId) -> Result<&Geometry, SceneError> {
        self.geometries
            .get(geom_id)
            .ok_or(SceneError::UnknownGeometry {
                geom_id: geom_id.raw(),
            })
    }

    pub fn subdiv_mesh(&self, geom_id: GeomId) -> Result<&SubdivMesh, SceneError> {
        match self.resolve(geom_id)? {
            Geometry::SubdivMesh(mesh) => Ok(mesh),
            other => Err(wrong_kind(geom_id, "subdivision mesh", other)),
        }
    }

    pub fn curves(&self, geom_id: GeomId) -> Result<&BezierCurves, SceneError> {
        match self.resolve(geom_id)? {
            Geometry::Curves(curves) => Ok(curves),
            other => Err(wrong_kind(geom_id, "bezier curves", other)),
        }
    }

    pub fn triangle_mesh(&self, geom_id: GeomId) -> Result<&TriangleMesh, SceneError> {
        match self.resolve(geom_id)? {
            Geometry::TriangleMesh(mesh) => Ok(mesh),
            other => Err(wrong_kind(geom_id, "triangle mesh", other)),
        }
    }
}

fn wrong_kind(geom_id: GeomId, expected: &'static str, actual: &Geometry) -> SceneError {
    SceneError::WrongGeometryKind {
        geom_id: geom_id.raw(),
        expected,
        actual: actual.kind_name(),
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SceneError {
    #[error("Geometry {geom_id} doesn't exist")]
    UnknownGeometry { geom_id: u32 },

    #[error("Geometry {geom_id} is {actual}, expected {expected}")]
    WrongGeometryKind {
        geom_id: u32,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Primitive {prim_id} of geometry {geom_id} doesn't exist")]
    PrimitiveOutOfRange { geom_id: u32, prim_id: u32 },

    #[error("Vertex index {index} out of range, geometry has {count} vertices")]
    VertexOutOfRange { index: u32, count: usize },

    #[error("Edge {from} -> {to} is used by more than one face")]
    NonManifoldEdge { from: u32, to: u32 },

    #[error("There is no edge between vertices {from} and {to}")]
    UnknownEdge { from: u32, to: u32 },
}
