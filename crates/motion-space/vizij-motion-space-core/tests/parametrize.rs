use approx::assert_relative_eq;
use nalgebra::Isometry2;
use vizij_motion_space_core::{
    AnimationParametrization, AnimationSegment, AnimationSet, AnimationSpace, Axis, Clip,
    Correspondence, DenseSamplingConfig, DenseSamplingParamBuilder, DenseSamplingParametrization,
    MatchGraph, MotionSpaceError, ParamAnimationBuilder, ParamChannel, ParamModel,
    ParamSpaceBuilder, ParamSpec, Skeleton, SpaceBuilder,
};

fn load_walk(set: &mut AnimationSet) -> Vec<AnimationSegment> {
    let clips: Vec<Clip> =
        vizij_test_fixtures::spaces::clips("walk").expect("load walk space clips");
    clips
        .into_iter()
        .map(|clip| {
            let length = clip.length;
            AnimationSegment::new(set.add_clip(clip), 0.0, length)
        })
        .collect()
}

fn skeleton() -> Skeleton {
    vizij_test_fixtures::skeletons::load("biped").expect("load biped skeleton")
}

fn specs() -> Vec<ParamSpec> {
    vizij_test_fixtures::param_specs::load("walk-speed-turn").expect("load param specs")
}

fn dense(target: usize) -> ParamAnimationBuilder<DenseSamplingParamBuilder> {
    ParamAnimationBuilder::new(DenseSamplingParamBuilder::new(DenseSamplingConfig {
        target_samples: target,
        ..DenseSamplingConfig::default()
    }))
}

fn built_walk(set: &mut AnimationSet) -> AnimationSpace {
    let segments = load_walk(set);
    let mut space = set.create_space("walk");
    SpaceBuilder::default()
        .build_from_segments(&mut space, set, &segments)
        .expect("build walk space");
    space
}

#[test]
fn fixture_manifest_lists_walk_space() {
    assert!(vizij_test_fixtures::spaces::keys().contains(&"walk".to_string()));
    let clip_keys = vizij_test_fixtures::clips::keys();
    assert!(clip_keys.contains(&"walk-fast".to_string()), "{clip_keys:?}");
    let entry = vizij_test_fixtures::spaces::entry("walk").unwrap();
    assert_eq!(entry.clips.len(), 3);
    assert_eq!(entry.skeleton, "biped");
    let clip: Clip = vizij_test_fixtures::clips::load("walk-fast").unwrap();
    assert_eq!(clip.track_layout(), vec!["hips".to_string(), "foot_l".to_string()]);
    assert_relative_eq!(clip.length, 0.8);
}

#[test]
fn base_samples_measure_bone_transforms() {
    let mut set = AnimationSet::new();
    let space = built_walk(&mut set);
    let samples = dense(50)
        .extract_base_samples(&space, &set, &skeleton(), &specs())
        .unwrap();
    assert_eq!(samples.len(), 3);
    assert_relative_eq!(samples[0][0], 1.0, epsilon = 1e-4);
    assert_relative_eq!(samples[1][0], 1.6, epsilon = 1e-4);
    assert_relative_eq!(samples[2][0], 0.97, epsilon = 1e-4);
    assert_relative_eq!(samples[0][1], 0.0, epsilon = 1e-3);
    assert_relative_eq!(samples[2][1], 0.5f32.to_degrees(), epsilon = 1e-2);
}

#[test]
fn parametrize_installs_dense_model() {
    let mut set = AnimationSet::new();
    let mut space = built_walk(&mut set);
    let report = dense(60)
        .parametrize(&mut space, &set, &skeleton(), &specs())
        .unwrap();
    assert_eq!(report.requested, 60);
    assert!(report.achieved >= 3 && report.achieved <= 60);

    let param = space.parametrization().unwrap();
    assert_eq!(param.names(), &["distance".to_string(), "turn".to_string()]);
    let ParamModel::DenseSampling(model) = param.model();
    assert_eq!(model.len(), report.achieved);
    for sample in model.samples() {
        assert_relative_eq!(sample.weights.iter().sum::<f32>(), 1.0, epsilon = 1e-4);
    }

    let at_fast = param.base_samples()[1].clone();
    assert_eq!(space.sample(&at_fast).unwrap(), vec![0.0, 1.0, 0.0]);

    let between = space.sample(&[1.3, 0.0]).unwrap();
    assert_eq!(between.len(), 3);
    assert!(between[2].abs() < between[1], "weights {between:?}");
}

/// Keeps only the one-hot base samples and reports how many it saw.
struct BaseSamplesOnly;

impl ParamSpaceBuilder for BaseSamplesOnly {
    type Report = usize;

    fn build_parametrization(
        &self,
        names: Vec<String>,
        base_samples: Vec<Vec<f32>>,
    ) -> (AnimationParametrization, usize) {
        let n = base_samples.len();
        let mut dense = DenseSamplingParametrization::new(1);
        for (j, params) in base_samples.iter().enumerate() {
            let mut weights = vec![0.0; n];
            weights[j] = 1.0;
            dense.add_sample(params.clone(), weights);
        }
        let model = ParamModel::DenseSampling(dense);
        (AnimationParametrization::new(names, base_samples, model), n)
    }
}

#[test]
fn custom_strategy_reports_its_own_summary() {
    let mut set = AnimationSet::new();
    let mut space = built_walk(&mut set);
    let seen = ParamAnimationBuilder::new(BaseSamplesOnly)
        .parametrize(&mut space, &set, &skeleton(), &specs())
        .unwrap();
    assert_eq!(seen, 3);
    let at_turn = space.parametrization().unwrap().base_samples()[2].clone();
    let weights = space.sample(&at_turn).unwrap();
    assert_eq!(weights, vec![0.0, 0.0, 1.0]);
}

#[test]
fn timewarp_maps_source_time_onto_each_clip() {
    let mut set = AnimationSet::new();
    let segments = load_walk(&mut set);
    let mut graph = MatchGraph::new();
    let nodes: Vec<_> = segments.iter().map(|&s| graph.add_node(s)).collect();
    for (i, &node) in nodes.iter().enumerate().skip(1) {
        let len = segments[i].duration();
        let samples = (0..=10)
            .map(|k| {
                let u = k as f32 / 10.0;
                Correspondence::new(u, u * len, Isometry2::identity())
            })
            .collect();
        graph.add_edge(nodes[0], node, 1.0, samples).unwrap();
    }
    let mut space = set.create_space("walk");
    SpaceBuilder::default()
        .build(&mut space, &mut set, &graph, nodes[0])
        .unwrap();

    let mut halfway = specs();
    for spec in &mut halfway {
        spec.source_time = 0.5;
    }
    let samples = dense(10)
        .extract_base_samples(&space, &set, &skeleton(), &halfway)
        .unwrap();
    assert_relative_eq!(samples[0][0], 0.5, epsilon = 1e-3);
    assert_relative_eq!(samples[1][0], 0.8, epsilon = 1e-3);
}

#[test]
fn invalid_requests_are_errors() {
    let mut set = AnimationSet::new();
    let empty = set.create_space("empty");
    assert_eq!(
        dense(10)
            .extract_base_samples(&empty, &set, &skeleton(), &specs())
            .unwrap_err(),
        MotionSpaceError::EmptySpace
    );

    let mut space = built_walk(&mut set);
    let bad_source = vec![ParamSpec {
        name: "x".into(),
        bone: "hips".into(),
        superior: None,
        channel: ParamChannel::Translation,
        axis: Axis::X,
        scale: 1.0,
        source_clip: 7,
        source_time: 0.0,
    }];
    assert!(matches!(
        dense(10).parametrize(&mut space, &set, &skeleton(), &bad_source),
        Err(MotionSpaceError::InvalidParamSource { index: 7, count: 3, .. })
    ));

    let mut unknown_bone = bad_source.clone();
    unknown_bone[0].source_clip = 0;
    unknown_bone[0].bone = "tail".into();
    assert_eq!(
        dense(10)
            .parametrize(&mut space, &set, &skeleton(), &unknown_bone)
            .unwrap_err(),
        MotionSpaceError::UnknownBone("tail".into())
    );
    assert!(space.parametrization().is_none());
}
