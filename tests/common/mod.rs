#![allow(dead_code)]

use anyhow::Result;
use packetbvh::{
    Geometry, Scene,
    geometry::{FloatType, WorldPoint, WorldVector},
    scene::{BezierCurves, CurveVertex, SubdivMesh, TriangleMesh},
};
use rand::{Rng, SeedableRng, rngs::SmallRng};

/// `n` x `n` quads in the z = 0 plane, face (x, y) has index `y * n + x`
pub fn grid_mesh(n: u32) -> Result<SubdivMesh> {
    let vertex_index = |x: u32, y: u32| y * (n + 1) + x;
    let vertices = (0..=n)
        .flat_map(|y| (0..=n).map(move |x| WorldPoint::new(x as FloatType, y as FloatType, 0.0)))
        .collect();
    let faces: Vec<[u32; 4]> = (0..n)
        .flat_map(|y| {
            (0..n).map(move |x| {
                [
                    vertex_index(x, y),
                    vertex_index(x + 1, y),
                    vertex_index(x + 1, y + 1),
                    vertex_index(x, y + 1),
                ]
            })
        })
        .collect();
    Ok(SubdivMesh::new(vertices, &faces)?)
}

/// Small random triangles scattered in a cube of side 200 centered at the origin
pub fn triangle_soup(rng: &mut SmallRng, count: u32) -> Result<TriangleMesh> {
    let mut vertices = Vec::with_capacity(3 * count as usize);
    for _ in 0..count {
        let center = WorldPoint::new(
            rng.random_range(-100.0..100.0),
            rng.random_range(-100.0..100.0),
            rng.random_range(-100.0..100.0),
        );
        for _ in 0..3 {
            vertices.push(
                center
                    + WorldVector::new(
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                    ),
            );
        }
    }
    let triangles = (0..count).map(|i| [3 * i, 3 * i + 1, 3 * i + 2]).collect();
    Ok(TriangleMesh::new(vertices, triangles)?)
}

/// `count` identical triangles
pub fn stacked_triangles(count: u32) -> Result<TriangleMesh> {
    Ok(TriangleMesh::new(
        vec![
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 0.0, 0.0),
            WorldPoint::new(0.0, 1.0, 0.0),
        ],
        (0..count).map(|_| [0, 1, 2]).collect(),
    )?)
}

/// Random hair strands growing up from the z = 0 plane
pub fn hair(rng: &mut SmallRng, count: u32) -> Result<BezierCurves> {
    let mut vertices = Vec::with_capacity(4 * count as usize);
    for _ in 0..count {
        let root = WorldPoint::new(rng.random_range(0.0..10.0), rng.random_range(0.0..10.0), 0.0);
        let length: FloatType = rng.random_range(0.5..5.0);
        for i in 0..4 {
            let t = i as FloatType / 3.0;
            let bend = WorldVector::new(rng.random_range(-0.3..0.3), rng.random_range(-0.3..0.3), 0.0);
            vertices.push(CurveVertex::new(
                root + WorldVector::new(0.0, 0.0, length * t) + bend * t,
                0.05 * (1.0 - 0.5 * t),
            ));
        }
    }
    Ok(BezierCurves::new(vertices, (0..count).map(|i| 4 * i).collect())?)
}

pub fn rng() -> SmallRng {
    SmallRng::seed_from_u64(0xb7a)
}

pub fn scene_with(geometries: impl IntoIterator<Item = Geometry>) -> Scene {
    let mut scene = Scene::new();
    for geometry in geometries {
        scene.add(geometry);
    }
    scene
}
