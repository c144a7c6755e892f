//! End-to-end tests for pipelines and unions over blocked data.

#[cfg(test)]
mod tests {
    use crate::blocks::{Block, BlockStore, Dataset};
    use crate::errors::BlockflowError;
    use crate::estimator::{Estimator, EstimatorHandle, FitParams};
    use crate::params;
    use crate::params::{ParamValue, Params};
    use crate::pipeline::{FeatureUnion, FitState, Pipeline};
    use crate::testing::{
        assert_blocks_equal, assert_dense_close, classification_frame, init_test_tracing, junkfood,
        junkfood_texts, CountVectorizer, NearestCentroid, Scaler, VarianceThreshold,
    };
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn text_pipeline() -> Pipeline {
        Pipeline::new(vec![
            ("vect", EstimatorHandle::new(CountVectorizer::new())),
            ("filter", EstimatorHandle::new(VarianceThreshold::new(0.0))),
        ])
        .unwrap()
    }

    fn text_union() -> FeatureUnion {
        FeatureUnion::new(vec![
            ("words", EstimatorHandle::new(CountVectorizer::new())),
            ("chars", EstimatorHandle::new(CountVectorizer::char_wb(3, 3))),
        ])
        .unwrap()
    }

    fn plain_values(params: &Params) -> Params {
        params
            .iter()
            .filter(|(_, v)| v.as_value().is_some())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn test_pipeline_matches_local_run_for_any_block_count() {
        init_test_tracing();
        let local_data = junkfood(1).unwrap();
        let mut local = text_pipeline();
        local.fit(&local_data, &FitParams::new()).unwrap();
        let whole = local_data.collect_features().unwrap();
        let expected = Estimator::transform(&local, &whole).unwrap();

        for n_partitions in [1, 2, 3, 6] {
            let data = junkfood(n_partitions).unwrap();
            assert_eq!(data.n_blocks(), n_partitions);

            let mut split = text_pipeline();
            split.fit(&data, &FitParams::new()).unwrap();
            let fitted_then_transformed = split.transform(&data).unwrap().collect_features().unwrap();
            assert_blocks_equal(&fitted_then_transformed, &expected);

            let mut combined = text_pipeline();
            let fit_transformed = combined
                .fit_transform(&data, &FitParams::new())
                .unwrap()
                .collect_features()
                .unwrap();
            assert_blocks_equal(&fit_transformed, &expected);
        }
    }

    #[test]
    fn test_union_matches_local_run_for_any_block_count() {
        let mut local = text_union();
        let expected = local
            .fit_transform(&junkfood(1).unwrap(), &FitParams::new())
            .unwrap()
            .collect_features()
            .unwrap();

        for n_partitions in [2, 3, 6] {
            let data = junkfood(n_partitions).unwrap();
            let mut union = text_union();
            union.fit(&data, &FitParams::new()).unwrap();
            assert_blocks_equal(&union.transform(&data).unwrap().collect_features().unwrap(), &expected);

            let mut again = text_union().with_n_jobs(Some(1));
            let out = again.fit_transform(&data, &FitParams::new()).unwrap();
            assert_eq!(out.n_blocks(), n_partitions);
            assert_blocks_equal(&out.collect_features().unwrap(), &expected);
        }
    }

    #[test]
    fn test_pipeline_ending_in_union_matches_local_run() {
        let build = || {
            let features = text_union().with_weights([("words", 10.0)]).unwrap();
            Pipeline::new(vec![("features", EstimatorHandle::new(features))]).unwrap()
        };
        let mut local = build();
        let local_data = junkfood(1).unwrap();
        local.fit(&local_data, &FitParams::new()).unwrap();
        let expected = Estimator::transform(&local, &local_data.collect_features().unwrap()).unwrap();

        for n_partitions in [2, 3, 6] {
            let data = junkfood(n_partitions).unwrap();
            let mut nested = build();
            let out = nested.fit_transform(&data, &FitParams::new()).unwrap();
            assert_eq!(out.n_blocks(), n_partitions);
            assert_blocks_equal(&out.collect_features().unwrap(), &expected);
            assert_eq!(nested.feature_names().unwrap(), local.feature_names().unwrap());
        }
    }

    #[test]
    fn test_union_of_pipelines_matches_local_run() {
        let build = || {
            FeatureUnion::new(vec![
                ("filtered", EstimatorHandle::new(text_pipeline())),
                (
                    "chars",
                    EstimatorHandle::new(
                        Pipeline::new(vec![("vect", EstimatorHandle::new(CountVectorizer::char_wb(3, 3)))])
                            .unwrap(),
                    ),
                ),
            ])
            .unwrap()
        };
        let mut local = build();
        let expected = local
            .fit_transform(&junkfood(1).unwrap(), &FitParams::new())
            .unwrap()
            .collect_features()
            .unwrap();
        assert_eq!(expected.n_rows(), 6);

        for n_partitions in [2, 3, 6] {
            let data = junkfood(n_partitions).unwrap();
            let mut union = build();
            union.fit(&data, &FitParams::new()).unwrap();
            let out = union.transform(&data).unwrap();
            assert_eq!(out.n_blocks(), n_partitions);
            assert_blocks_equal(&out.collect_features().unwrap(), &expected);
        }
    }

    #[test]
    fn test_predictions_match_across_block_counts() {
        let build = || {
            Pipeline::new(vec![
                ("scale", EstimatorHandle::new(Scaler::new(0.5))),
                ("clf", EstimatorHandle::new(NearestCentroid::new())),
            ])
            .unwrap()
        };
        let single = classification_frame(40, 4, 1).unwrap();
        let mut reference = build();
        reference.fit(&single, &FitParams::new()).unwrap();
        let expected = reference.predict(&single).unwrap().collect().unwrap();

        for n_partitions in [2, 4, 5] {
            let data = classification_frame(40, 4, n_partitions).unwrap();
            let mut pipe = build();
            pipe.fit(&data, &FitParams::new()).unwrap();
            assert_eq!(pipe.predict(&data).unwrap().collect().unwrap(), expected);
        }
    }

    #[test]
    fn test_weight_scales_only_the_named_branch() {
        let data = Dataset::from(
            BlockStore::from_block(&Block::Dense(array![[1.0, -2.0], [0.5, 4.0], [3.0, 0.0]]), 2, None)
                .unwrap(),
        );
        let build = || {
            FeatureUnion::new(vec![
                ("keep", EstimatorHandle::new(Scaler::new(1.0))),
                ("triple", EstimatorHandle::new(Scaler::new(3.0))),
            ])
            .unwrap()
        };
        let mut unweighted = build();
        let base = unweighted
            .fit_transform(&data, &FitParams::new())
            .unwrap()
            .collect_features()
            .unwrap()
            .to_dense()
            .unwrap();

        for w in [0.0, 0.5, 1.0, 2.5] {
            let mut weighted = build().with_weights([("triple", w)]).unwrap();
            let out = weighted
                .fit_transform(&data, &FitParams::new())
                .unwrap()
                .collect_features()
                .unwrap()
                .to_dense()
                .unwrap();
            let mut expected = base.clone();
            expected.columns_mut().into_iter().skip(2).for_each(|mut c| c *= w);
            assert_dense_close(&out, &expected, 1e-12);
        }
    }

    #[test]
    fn test_set_params_with_own_deep_params_is_idempotent() {
        let union = EstimatorHandle::new(text_union());
        let mut pipe = Pipeline::new(vec![
            ("features", union),
            ("filter", EstimatorHandle::new(VarianceThreshold::new(0.0))),
        ])
        .unwrap();
        pipe.set_params(params! { "features__words__min_df" => 2, "features__chars__lowercase" => false })
            .unwrap();

        let before = pipe.get_params(true);
        assert!(before.contains_key("features__words__ngram_range"));
        assert!(before.contains_key("features__transformer_weights"));
        pipe.set_params(before.clone()).unwrap();
        assert_eq!(pipe.get_params(true), before);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let pipe = Pipeline::new(vec![
            ("a", EstimatorHandle::new(Scaler::new(1.0))),
            ("a", EstimatorHandle::new(Scaler::new(2.0))),
        ]);
        assert_eq!(pipe.unwrap_err().error_info.code, "COMPOSE-002-DUPLICATE");

        let union = FeatureUnion::new(vec![
            ("a", EstimatorHandle::new(Scaler::new(1.0))),
            ("b", EstimatorHandle::new(Scaler::new(1.0))),
            ("a", EstimatorHandle::new(Scaler::new(1.0))),
        ]);
        let err = union.unwrap_err();
        assert_eq!(err.steps, vec!["a".to_string()]);
    }

    #[test]
    fn test_unknown_step_prefix_leaves_params_unchanged() {
        let mut pipe = text_pipeline();
        let before = pipe.get_params(true);

        let err = pipe
            .set_params(params! { "vect__min_df" => 2, "classifier__C" => 1.0 })
            .unwrap_err();
        assert!(matches!(err, BlockflowError::Parameter(_)));
        assert_eq!(pipe.get_params(true), before);

        let err = pipe.set_params(params! { "filter__min_df" => 2 }).unwrap_err();
        assert!(err.to_string().contains("min_df"));
        assert_eq!(pipe.get_params(true), before);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = text_pipeline();
        let cloned = original.clone();
        assert_eq!(plain_values(&original.get_params(true)), plain_values(&cloned.get_params(true)));
        for name in ["vect", "filter"] {
            let (a, b) = (original.step(name).unwrap(), cloned.step(name).unwrap());
            assert!(!a.ptr_eq(b));
        }

        original.set_params(params! { "vect__min_df" => 2 }).unwrap();
        assert_eq!(original.get_params(true)["vect__min_df"], ParamValue::from(2));
        assert_eq!(cloned.get_params(true)["vect__min_df"], ParamValue::from(1));

        original.fit(&junkfood(2).unwrap(), &FitParams::new()).unwrap();
        assert_eq!(cloned.state(), FitState::Unfit);
        assert!(!cloned.step("vect").unwrap().read().is_fitted());
    }

    #[test]
    fn test_six_records_in_two_blocks_keep_their_order() {
        let split = BlockStore::from_texts(junkfood_texts(), 2, None).unwrap();
        assert_eq!(split.layout().partitions(), &[vec![3], vec![3]]);
        let whole = BlockStore::from_texts(junkfood_texts(), 1, None).unwrap();

        let mut vect = Pipeline::new(vec![("vect", EstimatorHandle::new(CountVectorizer::new()))]).unwrap();
        vect.fit(&Dataset::from(whole.clone()), &FitParams::new()).unwrap();
        let blocked = vect.transform(&Dataset::from(split)).unwrap().collect_features().unwrap();
        let single = vect.transform(&Dataset::from(whole)).unwrap().collect_features().unwrap();
        assert_blocks_equal(&blocked, &single);

        let mut clf = Pipeline::new(vec![("clf", EstimatorHandle::new(NearestCentroid::new()))]).unwrap();
        clf.fit(&classification_frame(6, 2, 1).unwrap(), &FitParams::new()).unwrap();
        let two_blocks = clf.predict(&classification_frame(6, 2, 2).unwrap()).unwrap();
        assert_eq!(two_blocks.layout().partitions(), &[vec![3], vec![3]]);
        let one_block = clf.predict(&classification_frame(6, 2, 1).unwrap()).unwrap();
        assert_eq!(two_blocks.collect().unwrap(), one_block.collect().unwrap());
    }

    #[test]
    fn test_union_feature_names_follow_declaration_order() {
        let mut words = CountVectorizer::new();
        words.reset();
        let docs = Block::from(junkfood_texts());
        words
            .partial_fit(&crate::blocks::Batch { x: &docs, y: None }, &FitParams::new())
            .unwrap();
        words.finish_fit(&FitParams::new()).unwrap();
        let word_names = words.feature_names().unwrap();

        let mut previous: Option<Vec<String>> = None;
        for n_partitions in [1, 2, 3] {
            let mut union = text_union();
            union.fit(&junkfood(n_partitions).unwrap(), &FitParams::new()).unwrap();
            let names = union.get_feature_names().unwrap();

            let prefixed: Vec<String> = word_names.iter().map(|n| format!("words__{n}")).collect();
            assert_eq!(names[..prefixed.len()], prefixed[..]);
            assert!(names[prefixed.len()..].iter().all(|n| n.starts_with("chars__")));
            if let Some(previous) = &previous {
                assert_eq!(&names, previous);
            }
            previous = Some(names);
        }
    }
}
