mod common;

use anyhow::Result;
use assert2::{assert, let_assert};
use packetbvh::{
    BuildError, BuildSettings, Geometry, Scene, build_bvh,
    bvh::{NodeLink, PrimRef, PrimRefWriter, PrimitiveBuilder},
    geometry::WorldBox,
    primitives::{
        CurveSegment, HairBuilder, PrimitiveType, SubdivPatch, SubdivPatchBuilder, Triangle8,
        TriangleBuilder,
    },
    scene::GeomId,
};

use common::{grid_mesh, hair, rng, scene_with, stacked_triangles, triangle_soup};

#[test]
fn empty_source_gives_empty_tree() -> Result<()> {
    let scene = Scene::new();
    let settings = BuildSettings::default();

    let patches = build_bvh(&SubdivPatchBuilder::new(&scene), &settings)?;
    let curves = build_bvh(&HairBuilder::new(&scene), &settings)?;
    let triangles = build_bvh(&TriangleBuilder::new(&scene), &settings)?;

    assert!(patches.is_empty());
    assert!(patches.root() == NodeLink::Null);
    assert!(patches.primitive_count() == 0);
    assert!(patches.bounding_box().is_empty());
    assert!(patches.leaves().count() == 0);
    assert!(curves.is_empty());
    assert!(triangles.is_empty());
    assert!(triangles.blocks().is_empty());
    Ok(())
}

#[test]
fn geometry_of_other_kinds_is_ignored() -> Result<()> {
    let scene = scene_with([Geometry::TriangleMesh(stacked_triangles(5)?)]);
    let bvh = build_bvh(&SubdivPatchBuilder::new(&scene), &BuildSettings::default())?;
    assert!(bvh.is_empty());
    Ok(())
}

#[test]
fn coincident_primitives_one_over_leaf_size() -> Result<()> {
    let scene = scene_with([Geometry::TriangleMesh(stacked_triangles(9)?)]);
    let settings = BuildSettings::builder().max_leaf_size(8).build();
    let bvh = build_bvh(&TriangleBuilder::new(&scene), &settings)?;
    bvh.validate()?;

    let_assert!(NodeLink::Inner { .. } = bvh.root());
    let fills: Vec<_> = bvh
        .leaves()
        .map(|leaf| leaf.blocks.iter().map(|b| b.primitive_count()).sum::<usize>())
        .collect();
    assert!(fills == [4, 5]);
    Ok(())
}

#[test]
fn random_soup_is_contained() -> Result<()> {
    let mut rng = rng();
    let scene = scene_with([
        Geometry::TriangleMesh(triangle_soup(&mut rng, 3000)?),
        Geometry::TriangleMesh(triangle_soup(&mut rng, 500)?),
    ]);
    assert!(scene.primitive_count() == 3500);

    let settings = BuildSettings::builder()
        .max_leaf_size(4)
        .parallel_threshold(64)
        .build();
    let bvh = build_bvh(&TriangleBuilder::new(&scene), &settings)?;
    bvh.validate()?;
    assert!(bvh.primitive_count() == 3500);

    for (geom_id, geometry) in scene.geometries() {
        let Geometry::TriangleMesh(mesh) = geometry else {
            unreachable!()
        };
        for i in 0..mesh.triangle_count() {
            let bounds = mesh.triangle(i).unwrap().bounds();
            assert!(bvh.bounding_box().contains_box(&bounds), "{geom_id:?} {i}");
        }
    }

    let stats = bvh.statistics();
    assert!(stats.leaf_fill.max <= 4);
    assert!(stats.leaf_blocks.max == 1);
    Ok(())
}

#[test]
fn filling_twice_gives_same_records() -> Result<()> {
    let scene = scene_with([Geometry::SubdivMesh(grid_mesh(6)?)]);
    let refs: Vec<_> = (0..36)
        .map(|i| PrimRef::new(WorldBox::empty(), GeomId::from_raw(0), i))
        .collect();

    let mut i = 0;
    while i < refs.len() {
        let start = i;
        let a = SubdivPatch::fill_from_slice(&refs, &mut i, refs.len(), &scene, false, 0)?;
        let mut j = start;
        let b = SubdivPatch::fill_from_slice(&refs, &mut j, refs.len(), &scene, false, 0)?;
        assert!(a == b);
        assert!(i == j);
        assert!(a.geom_id() == refs[start].geom_id);
        assert!(a.prim_id() == refs[start].prim_id);
    }
    Ok(())
}

#[test]
fn list_mode_marks_last_block_of_every_leaf() -> Result<()> {
    let scene = scene_with([Geometry::SubdivMesh(grid_mesh(10)?)]);
    let settings = BuildSettings::builder().max_leaf_size(3).list_mode(true).build();
    let bvh = build_bvh(&SubdivPatchBuilder::new(&scene), &settings)?;
    bvh.validate()?;

    for leaf in bvh.leaves() {
        let (last, rest) = leaf.blocks.split_last().unwrap();
        assert!(last.is_last());
        assert!(rest.iter().all(|b| !b.is_last()));
    }

    let plain = build_bvh(
        &SubdivPatchBuilder::new(&scene),
        &BuildSettings::builder().max_leaf_size(3).build(),
    )?;
    assert!(plain.blocks().iter().all(|b| !b.is_last()));
    Ok(())
}

#[test]
fn interior_patches_are_regular() -> Result<()> {
    let scene = scene_with([Geometry::SubdivMesh(grid_mesh(4)?)]);
    let bvh = build_bvh(&SubdivPatchBuilder::new(&scene), &BuildSettings::default())?;

    let mut regular: Vec<_> = bvh
        .blocks()
        .iter()
        .filter(|p| p.is_regular())
        .map(|p| p.prim_id())
        .collect();
    regular.sort();
    assert!(regular == [5, 6, 9, 10]);
    Ok(())
}

#[test]
fn hair_pieces_follow_segment_length() -> Result<()> {
    let mut rng = rng();
    let scene = scene_with([Geometry::Curves(hair(&mut rng, 200)?)]);
    let settings = BuildSettings::builder()
        .max_segment_length(1.0)
        .max_segments(4)
        .growth_factor(4.0)
        .build();
    let bvh = build_bvh(&HairBuilder::new(&scene), &settings)?;
    bvh.validate()?;

    let curves = scene.curves(GeomId::from_raw(0))?;
    let mut pieces = vec![0u32; curves.curve_count()];
    for segment in bvh.blocks() {
        pieces[segment.prim_id() as usize] += 1;
    }

    let mut total = 0;
    for (i, &count) in pieces.iter().enumerate() {
        let expected = HairBuilder::segment_count(&curves.curve(i).unwrap(), &settings);
        assert!(count == expected, "curve {i}");
        assert!((1..=4).contains(&count));
        total += count as usize;
    }
    assert!(bvh.primitive_count() == total);
    assert!(total > curves.curve_count());
    Ok(())
}

/// Emits every triangle twice, the second copy shifted up by one unit.
struct DoublingBuilder<'s> {
    scene: &'s Scene,
    triangles: TriangleBuilder<'s>,
}

impl PrimitiveBuilder for DoublingBuilder<'_> {
    type Primitive = Triangle8;

    fn builder_name(&self) -> &'static str {
        "doubled triangles"
    }

    fn primitive_count(&self) -> usize {
        self.triangles.primitive_count()
    }

    fn compute_prim_refs(
        &self,
        _settings: &BuildSettings,
        writer: &mut PrimRefWriter<'_>,
    ) -> Result<(), BuildError> {
        let geom_id = GeomId::from_raw(0);
        let mesh = self.scene.triangle_mesh(geom_id)?;
        for i in writer.task().range(mesh.triangle_count()) {
            let bounds = mesh.triangle(i).unwrap().bounds();
            writer.push(PrimRef::new(bounds.clone(), geom_id, i as u32))?;
            writer.push(PrimRef::new(bounds, geom_id, i as u32))?;
        }
        Ok(())
    }

    fn create_leaf(
        &self,
        settings: &BuildSettings,
        refs: &[PrimRef],
        out: &mut [Option<Triangle8>],
    ) -> Result<(), BuildError> {
        self.triangles.create_leaf(settings, refs, out)
    }
}

#[test]
fn reference_overflow_is_fatal() -> Result<()> {
    let mut rng = rng();
    let scene = scene_with([Geometry::TriangleMesh(triangle_soup(&mut rng, 100)?)]);
    let builder = DoublingBuilder {
        scene: &scene,
        triangles: TriangleBuilder::new(&scene),
    };

    let_assert!(
        Err(BuildError::PrimRefOverflow { .. }) = build_bvh(&builder, &BuildSettings::default())
    );

    let roomy = BuildSettings::builder().growth_factor(2.0).build();
    let bvh = build_bvh(&builder, &roomy)?;
    bvh.validate()?;
    assert!(bvh.primitive_count() == 200);
    Ok(())
}

#[test]
fn scene_errors_abort_the_build() -> Result<()> {
    let scene = scene_with([Geometry::TriangleMesh(stacked_triangles(3)?)]);
    let other = scene_with([Geometry::TriangleMesh(stacked_triangles(1)?)]);
    let builder = DoublingBuilder {
        scene: &scene,
        triangles: TriangleBuilder::new(&other),
    };

    let settings = BuildSettings::builder().growth_factor(2.0).build();
    let_assert!(Err(BuildError::Scene(_)) = build_bvh(&builder, &settings));
    Ok(())
}

#[test]
fn invalid_settings_are_rejected() {
    let scene = Scene::new();
    let settings = BuildSettings::builder().bin_count(1).build();
    let_assert!(
        Err(BuildError::InvalidSettings(_)) = build_bvh(&TriangleBuilder::new(&scene), &settings)
    );

    let settings = BuildSettings::builder().growth_factor(0.5).build();
    let_assert!(Err(BuildError::InvalidSettings(_)) = build_bvh(&HairBuilder::new(&scene), &settings));
}

#[test]
fn curve_segments_cover_their_curves() -> Result<()> {
    let mut rng = rng();
    let scene = scene_with([Geometry::Curves(hair(&mut rng, 20)?)]);
    let settings = BuildSettings::builder()
        .max_segment_length(0.5)
        .growth_factor(16.0)
        .build();
    let bvh = build_bvh(&HairBuilder::new(&scene), &settings)?;

    let mut ranges: Vec<(u32, f32, f32)> = bvh
        .blocks()
        .iter()
        .map(|s: &CurveSegment| {
            let (t0, t1) = s.t_range();
            (s.prim_id(), t0, t1)
        })
        .collect();
    ranges.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

    for curve in ranges.chunk_by(|a, b| a.0 == b.0) {
        assert!(curve.first().unwrap().1 == 0.0);
        assert!(curve.last().unwrap().2 == 1.0);
        for pair in curve.windows(2) {
            assert!(pair[0].2 == pair[1].1);
        }
    }
    Ok(())
}
