//! Build an index from observation files on disk and query it end to end.

use chrono::{TimeZone, Utc};

use observation_index::{
    IndexerConfig, LogicalOperator, ObservationFilter, ObservationIndex, ObservationIndexer,
    ObservationSearcher, ObservationType, Offering, ResponseMode,
};
use sos_common::{BoundingBox, SosError, TemporalGeometry, TemporalRelation};
use test_utils::{not_an_observation, DataDir, ObservationFixture};

fn config(data: &DataDir) -> IndexerConfig {
    IndexerConfig {
        observation_dir: data.observation_dir(),
        template_dir: Some(data.template_dir()),
        index_dir: data.index_dir(),
    }
}

fn build(data: &DataDir) -> ObservationSearcher {
    ObservationIndexer::new(config(data))
        .create_index()
        .expect("index build failed");
    ObservationSearcher::open(&data.index_dir()).expect("index open failed")
}

fn inline() -> ObservationFilter {
    ObservationFilter::observations(ResponseMode::Inline, ObservationType::Observation)
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// One single-point observation and one interval observation.
fn temporal_scenario() -> DataDir {
    let data = DataDir::new();
    data.add_observation(
        "a",
        &ObservationFixture::new("A").instant("2020-01-01T00:00:00Z").to_json(),
    );
    data.add_observation(
        "b",
        &ObservationFixture::new("B")
            .period("2020-01-01T00:00:00Z", "2020-01-05T00:00:00Z")
            .to_json(),
    );
    data
}

fn search(searcher: &ObservationSearcher, relation: TemporalRelation, time: &str) -> Vec<String> {
    let mut filter = inline();
    filter
        .set_time_filter(relation, &TemporalGeometry::parse(time).unwrap())
        .unwrap();
    filter.filter_observation(searcher).unwrap().into_iter().collect()
}

#[test]
fn test_during_matches_point_and_interval() {
    let data = temporal_scenario();
    let searcher = build(&data);
    assert_eq!(
        search(&searcher, TemporalRelation::During, "2019-12-01T00:00:00Z/2020-02-01T00:00:00Z"),
        names(&["A", "B"])
    );
}

#[test]
fn test_before_matches_by_begin() {
    let data = temporal_scenario();
    let searcher = build(&data);
    assert_eq!(
        search(&searcher, TemporalRelation::Before, "2020-01-02T00:00:00Z"),
        names(&["A", "B"])
    );
}

#[test]
fn test_equals_instant_inside_interval_only() {
    let data = temporal_scenario();
    let searcher = build(&data);
    assert_eq!(
        search(&searcher, TemporalRelation::Equals, "2020-01-03T00:00:00Z"),
        names(&["B"])
    );
    assert_eq!(
        search(&searcher, TemporalRelation::Equals, "2020-01-01T00:00:00Z"),
        names(&["A", "B"])
    );
}

#[test]
fn test_after_matches_straddling_interval() {
    let data = temporal_scenario();
    let searcher = build(&data);
    assert_eq!(
        search(&searcher, TemporalRelation::After, "2020-01-02T00:00:00Z"),
        names(&["B"])
    );
}

/// Interval observations around the period 2020-01-10/2020-01-20, one per overlap case.
fn overlap_scenario() -> DataDir {
    let data = DataDir::new();
    let periods = [
        ("inside", "2020-01-12T00:00:00Z", "2020-01-15T00:00:00Z"),
        ("left", "2020-01-05T00:00:00Z", "2020-01-12T00:00:00Z"),
        ("right", "2020-01-18T00:00:00Z", "2020-01-25T00:00:00Z"),
        ("cover", "2020-01-01T00:00:00Z", "2020-01-31T00:00:00Z"),
        ("earlier", "2020-01-01T00:00:00Z", "2020-01-05T00:00:00Z"),
        ("later", "2020-01-21T00:00:00Z", "2020-01-30T00:00:00Z"),
    ];
    for (id, begin, end) in periods {
        data.add_observation(id, &ObservationFixture::new(id).period(begin, end).to_json());
    }
    data.add_observation(
        "point_in",
        &ObservationFixture::new("point_in").instant("2020-01-15T00:00:00Z").to_json(),
    );
    data.add_observation(
        "point_out",
        &ObservationFixture::new("point_out").instant("2020-01-25T00:00:00Z").to_json(),
    );
    data
}

#[test]
fn test_during_covers_every_overlap_case() {
    let data = overlap_scenario();
    let searcher = build(&data);
    assert_eq!(
        search(&searcher, TemporalRelation::During, "2020-01-10T00:00:00Z/2020-01-20T00:00:00Z"),
        names(&["cover", "inside", "left", "point_in", "right"])
    );
}

#[test]
fn test_equals_period_needs_exact_bounds() {
    let data = overlap_scenario();
    let searcher = build(&data);
    assert_eq!(
        search(&searcher, TemporalRelation::Equals, "2020-01-05T00:00:00Z/2020-01-12T00:00:00Z"),
        names(&["left"])
    );
    assert!(search(&searcher, TemporalRelation::Equals, "2020-01-05T00:00:00Z/2020-01-13T00:00:00Z")
        .is_empty());
}

#[test]
fn test_procedure_selection() {
    let data = DataDir::new();
    data.add_observation("one", &ObservationFixture::new("one").procedure("P1").to_json());
    data.add_observation("two", &ObservationFixture::new("two").procedure("P2").to_json());
    data.add_observation("three", &ObservationFixture::new("three").procedure("P3").to_json());
    let searcher = build(&data);

    let offering = Offering {
        id: "offering-1".to_string(),
        procedures: names(&["P2", "P3"]),
        ..Default::default()
    };

    let mut explicit = inline();
    explicit.set_procedure(&names(&["P1"]), &[offering.clone()]);
    assert_eq!(
        explicit.filter_observation(&searcher).unwrap().into_iter().collect::<Vec<_>>(),
        names(&["one"])
    );

    let mut defaulted = inline();
    defaulted.set_procedure(&[], &[offering]);
    assert_eq!(
        defaulted.filter_observation(&searcher).unwrap().into_iter().collect::<Vec<_>>(),
        names(&["three", "two"])
    );

    let mut nothing = inline();
    nothing.set_procedure(&[], &[]);
    assert!(nothing.filter_observation(&searcher).unwrap().is_empty());
}

#[test]
fn test_property_and_feature_clauses() {
    let data = DataDir::new();
    data.add_observation(
        "t",
        &ObservationFixture::new("t").observed_property("temperature").feature_of_interest("s1").to_json(),
    );
    data.add_observation(
        "h",
        &ObservationFixture::new("h").observed_property("humidity").feature_of_interest("s2").to_json(),
    );
    let searcher = build(&data);

    let mut filter = inline();
    filter
        .set_observed_properties(&names(&["temperature", "humidity"]))
        .set_feature_of_interest(&names(&["s2"]));
    assert_eq!(
        filter.filter_observation(&searcher).unwrap().into_iter().collect::<Vec<_>>(),
        names(&["h"])
    );
}

#[test]
fn test_spatial_operators() {
    let data = DataDir::new();
    data.add_observation("paris", &ObservationFixture::new("paris").procedure("P1").at(2.35, 48.85).to_json());
    data.add_observation("denver", &ObservationFixture::new("denver").procedure("P1").at(-104.99, 39.74).to_json());
    data.add_observation("berlin", &ObservationFixture::new("berlin").procedure("P2").at(13.40, 52.52).to_json());
    let searcher = build(&data);
    let europe = BoundingBox::new(-15.0, 35.0, 45.0, 72.0);

    let run = |operator: LogicalOperator| {
        let mut filter = inline();
        filter
            .set_procedure(&names(&["P1"]), &[])
            .set_bounding_box(europe)
            .set_logical_operator(operator);
        filter.filter_observation(&searcher).unwrap().into_iter().collect::<Vec<_>>()
    };

    assert_eq!(run(LogicalOperator::And), names(&["paris"]));
    assert_eq!(run(LogicalOperator::Or), names(&["berlin", "denver", "paris"]));
    // everything except text-and-space matches
    assert_eq!(run(LogicalOperator::Not), names(&["berlin", "denver"]));
}

#[test]
fn test_results_sorted_by_begin_with_missing_first() {
    let data = DataDir::new();
    data.add_observation("late", &ObservationFixture::new("late").instant("2021-06-01T00:00:00Z").to_json());
    data.add_observation("early", &ObservationFixture::new("early").instant("2020-06-01T00:00:00Z").to_json());
    data.add_observation("untimed", &ObservationFixture::new("untimed").to_json());
    let searcher = build(&data);

    let results = inline().filter_result(&searcher).unwrap();
    let order: Vec<&str> = results.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(order, vec!["untimed", "early", "late"]);
    assert_eq!(
        results[1].begin,
        Some(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(results[1].end, None);
}

#[test]
fn test_measurements_and_templates_are_separate() {
    let data = DataDir::new();
    data.add_observation("plain", &ObservationFixture::new("plain").procedure("P1").to_json());
    data.add_observation(
        "measured",
        &ObservationFixture::new("measured").procedure("P1").measure(21.5, "degC").to_json(),
    );
    data.add_template("template", &ObservationFixture::new("template").procedure("P1").to_json());
    let searcher = build(&data);

    let measurements = ObservationFilter::observations(ResponseMode::Inline, ObservationType::Measurement)
        .filter_observation(&searcher)
        .unwrap();
    assert_eq!(measurements.into_iter().collect::<Vec<_>>(), names(&["measured"]));

    let templates = ObservationFilter::observations(ResponseMode::ResultTemplate, ObservationType::Observation)
        .filter_observation(&searcher)
        .unwrap();
    assert_eq!(templates.into_iter().collect::<Vec<_>>(), names(&["template"]));

    let results = ObservationFilter::get_result("P1", ObservationType::Observation)
        .filter_result(&searcher)
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].identifier, "plain");
}

#[test]
fn test_non_observation_files_are_skipped() {
    let data = DataDir::new();
    data.add_observation("good", &ObservationFixture::new("good").to_json());
    data.add_observation("other", &not_an_observation());
    data.add_raw_observation("notes.txt", "ignored entirely");

    let stats = ObservationIndexer::new(config(&data)).create_index().unwrap();
    assert_eq!(stats.observations, 1);
    assert_eq!(stats.templates, 0);
    assert_eq!(stats.skipped, 1);
}

#[cfg(unix)]
#[test]
fn test_unreadable_entry_is_skipped() {
    let data = DataDir::new();
    data.add_observation("good", &ObservationFixture::new("good").to_json());
    std::os::unix::fs::symlink(
        data.path().join("nowhere.json"),
        data.observation_dir().join("dangling.json"),
    )
    .unwrap();

    let stats = ObservationIndexer::new(config(&data)).create_index().unwrap();
    assert_eq!(stats.observations, 1);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn test_malformed_json_aborts_build() {
    let data = DataDir::new();
    data.add_observation("good", &ObservationFixture::new("good").to_json());
    data.add_raw_observation("broken.json", "{ \"id\": ");

    let result = ObservationIndexer::new(config(&data)).create_index();
    assert!(matches!(result, Err(SosError::IndexBuildFailure(_))));
}

#[test]
fn test_concurrent_build_is_rejected() {
    let data = DataDir::new();
    data.add_observation("good", &ObservationFixture::new("good").to_json());

    let _held = ObservationIndex::open_or_create(&data.index_dir())
        .unwrap()
        .writer()
        .unwrap();
    let result = ObservationIndexer::new(config(&data)).create_index();
    assert!(matches!(result, Err(SosError::IndexBuildFailure(_))));
}

#[test]
fn test_refresh_picks_up_new_files() {
    let data = DataDir::new();
    data.add_observation("first", &ObservationFixture::new("first").to_json());
    let indexer = ObservationIndexer::new(config(&data));
    indexer.create_index().unwrap();
    let searcher = ObservationSearcher::open(&data.index_dir()).unwrap();
    assert_eq!(inline().filter_observation(&searcher).unwrap().len(), 1);

    data.add_observation("second", &ObservationFixture::new("second").to_json());
    let stats = indexer.refresh(&searcher).unwrap();
    assert_eq!(stats.observations, 2);
    assert_eq!(inline().filter_observation(&searcher).unwrap().len(), 2);
}
