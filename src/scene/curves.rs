use crate::geometry::{FloatType, WorldPoint};

use super::SceneError;

/// Control point of a hair curve.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CurveVertex {
    pub position: WorldPoint,
    pub radius: FloatType,
}

impl CurveVertex {
    pub fn new(position: WorldPoint, radius: FloatType) -> CurveVertex {
        CurveVertex { position, radius }
    }
}

/// Set of cubic bezier curves with varying radius (hair).
/// Each curve uses four consecutive vertices starting at its first vertex index,
/// neighbouring curves may share vertices.
#[derive(Clone, Debug)]
pub struct BezierCurves {
    vertices: Vec<CurveVertex>,
    curves: Vec<u32>,
}

impl BezierCurves {
    pub fn new(vertices: Vec<CurveVertex>, curves: Vec<u32>) -> Result<BezierCurves, SceneError> {
        if let Some(&first) = curves
            .iter()
            .find(|&&first| first as usize + 4 > vertices.len())
        {
            return Err(SceneError::VertexOutOfRange {
                index: first + 3,
                count: vertices.len(),
            });
        }

        Ok(BezierCurves { vertices, curves })
    }

    pub fn curve_count(&self) -> usize {
        self.curves.len()
    }

    /// Control points of a single curve.
    pub fn curve(&self, index: usize) -> Option<[CurveVertex; 4]> {
        let first = *self.curves.get(index)? as usize;
        self.vertices[first..first + 4].try_into().ok()
    }
}
