mod common;

use chrono::Utc;
use rusqlite::params;
use serde_json::{Value, json};

use hoops_etl::shot_tracking::{
    self, ShotBucket, ShotTrackingRecord, WorkItem, load, pending_work, replay, select_pending,
    transform,
};
use hoops_etl::snapshot::{RawSnapshot, SnapshotStore, snapshot_file_name};
use hoops_etl::stats_api::{ApiRequest, SHOT_CHART_ENDPOINT};

use common::{FakeApi, Harness, read_fixture, seed_player_game, upstream_error};

fn lebron() -> WorkItem {
    WorkItem::new("0022300500", "2544", "1610612747")
}

fn shots(rows: Vec<Value>) -> Value {
    json!({"resultSets": [{
        "name": "Shot_Chart_Detail",
        "headers": ["SHOT_DISTANCE", "SHOT_MADE_FLAG"],
        "rowSet": rows
    }]})
}

fn stored_within_3ft(harness: &Harness, key: &str) -> (u32, u32, f64) {
    let conn = harness.warehouse().connect().expect("connect");
    conn.query_row(
        "SELECT shots_made_0_3ft, shots_attempted_0_3ft, shots_pct_0_3ft
         FROM fact_player_shot_tracking WHERE player_game_id = ?1",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .expect("shot tracking row")
}

fn no_api() -> FakeApi {
    FakeApi::new(|req| panic!("unexpected api call to {}", req.endpoint))
}

#[test]
fn zero_result_sets_is_an_empty_record() {
    let record = transform(&json!({"resultSets": []}), &lebron());
    assert_eq!(record, ShotTrackingRecord::empty(&lebron()));
    assert_eq!(record.player_game_id, "0022300500_2544");
    assert_eq!(record.within_3ft.pct(), 0.0);
}

#[test]
fn missing_top_level_structure_is_an_empty_record() {
    for doc in [
        json!({}),
        json!(null),
        json!({"resultSets": null}),
        json!({"resultSets": [{"name": "Shot_Chart_Detail"}]}),
        json!({"resultSets": [{"headers": "SHOT_DISTANCE", "rowSet": [[1, 1]]}]}),
    ] {
        assert_eq!(transform(&doc, &lebron()), ShotTrackingRecord::empty(&lebron()));
    }
}

#[test]
fn all_close_makes_are_a_perfect_bucket() {
    let rows = (0..=3).map(|d| json!([d, 1])).collect::<Vec<_>>();
    let record = transform(&shots(rows), &lebron());
    assert_eq!(record.within_3ft, ShotBucket { made: 4, attempted: 4 });
    assert_eq!(record.within_3ft.pct(), 1.0);
}

#[test]
fn counts_only_close_shots_and_only_flag_one_as_made() {
    let rows = vec![
        json!([0, 1]),
        json!([3, 1]),
        json!([2, 0]),
        json!([1, null]),
        json!([3, "made"]),
        json!([4, 1]),
        json!([24, 1]),
        json!([null, 1]),
    ];
    let record = transform(&shots(rows), &lebron());
    assert_eq!(record.within_3ft, ShotBucket { made: 2, attempted: 5 });
    assert_eq!(record.within_3ft.pct(), 0.4);
}

#[test]
fn no_close_shots_means_zero_pct() {
    let record = transform(&shots(vec![json!([12, 1]), json!([26, 0])]), &lebron());
    assert_eq!(record.within_3ft, ShotBucket::default());
    assert_eq!(record.within_3ft.pct(), 0.0);
}

#[test]
fn column_order_does_not_matter() {
    let forward = json!({"resultSets": [{
        "name": "Shot_Chart_Detail",
        "headers": ["SHOT_DISTANCE", "SHOT_MADE_FLAG", "SHOT_ZONE_BASIC"],
        "rowSet": [[1, 1, "Restricted Area"], [2, 0, "Restricted Area"], [23, 1, "Right Corner 3"]]
    }]});
    let reversed = json!({"resultSets": [{
        "name": "Shot_Chart_Detail",
        "headers": ["SHOT_ZONE_BASIC", "SHOT_MADE_FLAG", "SHOT_DISTANCE"],
        "rowSet": [["Restricted Area", 1, 1], ["Restricted Area", 0, 2], ["Right Corner 3", 1, 23]]
    }]});
    assert_eq!(transform(&forward, &lebron()), transform(&reversed, &lebron()));
}

#[test]
fn fixture_buckets_by_distance_and_zone() {
    let record = transform(&read_fixture("shot_chart.json"), &lebron());
    assert_eq!(record.within_3ft, ShotBucket { made: 2, attempted: 3 });
    assert!((record.within_3ft.pct() - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(record.from_3_to_10ft, ShotBucket { made: 0, attempted: 1 });
    assert_eq!(record.from_10_to_16ft, ShotBucket { made: 1, attempted: 1 });
    assert_eq!(record.long_two, ShotBucket { made: 0, attempted: 1 });
    assert_eq!(record.corner_three, ShotBucket { made: 1, attempted: 1 });
    assert_eq!(record.above_break_three, ShotBucket { made: 0, attempted: 1 });
    assert_eq!(record.dunks, ShotBucket { made: 1, attempted: 1 });
}

#[test]
fn loading_twice_replaces_the_row() {
    let harness = Harness::new(no_api());
    let mut record = ShotTrackingRecord::empty(&lebron());
    record.within_3ft = ShotBucket { made: 1, attempted: 4 };
    load(harness.warehouse(), &record).expect("first load");

    record.within_3ft = ShotBucket { made: 3, attempted: 3 };
    load(harness.warehouse(), &record).expect("second load");

    assert_eq!(
        harness
            .warehouse()
            .count_rows("fact_player_shot_tracking")
            .expect("count"),
        1
    );
    assert_eq!(stored_within_3ft(&harness, "0022300500_2544"), (3, 3, 1.0));
}

#[test]
fn selector_skips_done_keys_and_respects_limit() {
    let harness = Harness::new(no_api());
    for player in 1..=8 {
        seed_player_game(harness.warehouse(), "0022300500", &format!("10{player}"), "1610612747");
    }
    for player in ["101", "104"] {
        let item = WorkItem::new("0022300500", player, "1610612747");
        load(harness.warehouse(), &ShotTrackingRecord::empty(&item)).expect("load");
    }

    let batch = pending_work(harness.warehouse(), 5).expect("select");
    assert_eq!(batch.len(), 5);
    let all = pending_work(harness.warehouse(), 100).expect("select all");
    assert_eq!(all.len(), 6);
    for item in &all {
        assert_ne!(item.player_id, "101");
        assert_ne!(item.player_id, "104");
        assert_eq!(item.player_game_id, format!("0022300500_{}", item.player_id));
        assert_eq!(item.team_id, "1610612747");
    }
    assert!(pending_work(harness.warehouse(), 0).expect("zero").is_empty());
}

#[test]
fn selector_failure_reads_as_nothing_pending() {
    let harness = Harness::new(no_api());
    seed_player_game(harness.warehouse(), "0022300500", "2544", "1610612747");
    harness
        .warehouse()
        .connect()
        .expect("connect")
        .execute_batch("DROP TABLE fact_player_shot_tracking;")
        .expect("drop table");

    assert!(pending_work(harness.warehouse(), 5).is_err());
    assert!(select_pending(harness.warehouse(), 5).is_empty());

    let summary = shot_tracking::run(&harness.ctx, 5).expect("run still succeeds");
    assert_eq!(summary.selected, 0);
    assert_eq!(harness.ctx.api.call_count(), 0);
}

#[test]
fn failed_extraction_skips_only_that_item() {
    let api = FakeApi::new(|req| {
        if req.param("PlayerID") == Some("202") {
            return Err(upstream_error(req, 429));
        }
        Ok(shots(vec![json!([1, 1]), json!([2, 0])]))
    });
    let harness = Harness::new(api);
    for player in ["201", "202", "203"] {
        seed_player_game(harness.warehouse(), "0022300600", player, "1610612744");
    }

    let summary = shot_tracking::run(&harness.ctx, 5).expect("run");

    assert_eq!(summary.selected, 3);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.rows_loaded, 2);
    assert!(summary.errors[0].starts_with("0022300600_202: extract failed"));
    assert_eq!(harness.ctx.api.call_count(), 3);
    assert_eq!(
        harness
            .warehouse()
            .count_rows("fact_player_shot_tracking")
            .expect("count"),
        2
    );
    assert_eq!(stored_within_3ft(&harness, "0022300600_201"), (1, 2, 0.5));

    let raw = harness.raw_files();
    assert_eq!(raw.len(), 2);
    assert!(raw[0].starts_with("shot_chart_201_0022300600_"));
    assert!(raw[1].starts_with("shot_chart_203_0022300600_"));
    assert!(raw.iter().all(|name| name.ends_with(".json")));

    let left = pending_work(harness.warehouse(), 5).expect("select");
    assert_eq!(left, vec![WorkItem::new("0022300600", "202", "1610612744")]);
}

#[test]
fn every_request_asks_for_field_goal_attempts() {
    let api = FakeApi::new(|_| Ok(json!({"resultSets": []})));
    let harness = Harness::new(api);
    seed_player_game(harness.warehouse(), "0022300700", "1629029", "1610612742");

    shot_tracking::run(&harness.ctx, 5).expect("run");

    let calls = harness.ctx.api.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].endpoint, SHOT_CHART_ENDPOINT);
    assert_eq!(calls[0].param("ContextMeasure"), Some("FGA"));
    assert_eq!(calls[0].param("PlayerID"), Some("1629029"));
    assert_eq!(calls[0].param("GameID"), Some("0022300700"));
    assert_eq!(calls[0].param("TeamID"), Some("1610612742"));
}

#[test]
fn processed_without_shots_is_not_pending_again() {
    let api = FakeApi::new(|_| Ok(json!({"resultSets": []})));
    let harness = Harness::new(api);
    seed_player_game(harness.warehouse(), "0022300700", "1629029", "1610612742");

    let first = shot_tracking::run(&harness.ctx, 5).expect("first run");
    assert_eq!(first.processed, 1);
    assert_eq!(stored_within_3ft(&harness, "0022300700_1629029"), (0, 0, 0.0));

    let second = shot_tracking::run(&harness.ctx, 5).expect("second run");
    assert_eq!(second.selected, 0);
    assert_eq!(harness.ctx.api.call_count(), 1);
}

#[test]
fn run_respects_batch_limit() {
    let api = FakeApi::new(|_| Ok(json!({"resultSets": []})));
    let harness = Harness::new(api);
    for player in 0..7 {
        seed_player_game(harness.warehouse(), "0022300800", &format!("30{player}"), "1610612760");
    }

    let summary = shot_tracking::run(&harness.ctx, 5).expect("run");
    assert_eq!(summary.selected, 5);
    assert_eq!(harness.ctx.api.call_count(), 5);
    assert_eq!(pending_work(harness.warehouse(), 100).expect("select").len(), 2);
}

fn block_raw_dir(harness: &mut Harness) {
    let blocker = harness.dir.path().join("blocker");
    std::fs::write(&blocker, b"not a dir").expect("write blocker");
    harness.ctx.snapshots = SnapshotStore::new(blocker.join("raw"));
}

#[test]
fn unusable_raw_dir_fails_the_run() {
    let mut harness = Harness::new(no_api());
    seed_player_game(harness.warehouse(), "0022300900", "2544", "1610612747");
    block_raw_dir(&mut harness);

    assert!(shot_tracking::run(&harness.ctx, 5).is_err());
    assert_eq!(harness.ctx.api.call_count(), 0);
}

#[test]
fn nothing_pending_succeeds_without_touching_raw_dir() {
    let mut harness = Harness::new(no_api());
    block_raw_dir(&mut harness);

    let summary = shot_tracking::run(&harness.ctx, 5).expect("empty run succeeds");
    assert_eq!(summary.selected, 0);
    assert!(summary.is_clean());
}

#[test]
fn failed_load_rolls_back_and_batch_continues() {
    let api = FakeApi::new(|_| Ok(shots(vec![json!([1, 1]), json!([2, 1])])));
    let harness = Harness::new(api);
    for player in ["401", "402", "403"] {
        seed_player_game(harness.warehouse(), "0022301000", player, "1610612751");
    }
    harness
        .warehouse()
        .connect()
        .expect("connect")
        .execute_batch(
            "CREATE TRIGGER reject_402 BEFORE INSERT ON fact_player_shot_tracking
             WHEN NEW.player_game_id = '0022301000_402'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .expect("create trigger");

    let summary = shot_tracking::run(&harness.ctx, 5).expect("run");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.rows_loaded, 2);
    assert!(summary.errors[0].starts_with("0022301000_402: load failed"));
    assert_eq!(stored_within_3ft(&harness, "0022301000_401"), (2, 2, 1.0));
    assert_eq!(stored_within_3ft(&harness, "0022301000_403"), (2, 2, 1.0));

    let conn = harness.warehouse().connect().expect("connect");
    let partial: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM fact_player_shot_tracking WHERE player_game_id = '0022301000_402'",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(partial, 0);
    assert_eq!(
        pending_work(harness.warehouse(), 5).expect("select"),
        vec![WorkItem::new("0022301000", "402", "1610612751")]
    );
}

#[test]
fn replay_loads_a_saved_snapshot() {
    let harness = Harness::new(no_api());
    let request = ApiRequest::shot_chart("2544", "0022300500", "1610612747");
    let now = Utc::now();
    let snapshot = RawSnapshot::capture(&request, read_fixture("shot_chart.json"), now);
    harness.ctx.snapshots.ensure_dir().expect("raw dir");
    let path = harness
        .ctx
        .snapshots
        .write(&snapshot_file_name("shot_chart_2544_0022300500", now), &snapshot)
        .expect("write snapshot");

    let record = replay(harness.warehouse(), &path).expect("replay");
    assert_eq!(record.player_game_id, "0022300500_2544");
    assert_eq!(record.team_id, "1610612747");
    assert_eq!(stored_within_3ft(&harness, "0022300500_2544").1, 3);
}

#[test]
fn replay_rejects_other_endpoints() {
    let harness = Harness::new(no_api());
    let now = Utc::now();
    let snapshot = RawSnapshot::capture(&ApiRequest::box_score("0022300500"), json!({}), now);
    harness.ctx.snapshots.ensure_dir().expect("raw dir");
    let path = harness
        .ctx
        .snapshots
        .write("boxscore.json", &snapshot)
        .expect("write snapshot");

    assert!(replay(harness.warehouse(), &path).is_err());
    assert_eq!(
        harness
            .warehouse()
            .count_rows("fact_player_shot_tracking")
            .expect("count"),
        0
    );
}
