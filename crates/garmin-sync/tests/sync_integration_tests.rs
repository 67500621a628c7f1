//! End-to-end sync tests against a mocked Connect API.
//!
//! A wiremock server stands in for the upstream; the sync runs against a
//! CSV folder store in a temp directory and the persisted rows are
//! checked directly.

use chrono::NaiveDate;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use garmin_sync::client::{GarminClient, OAuth2Token};
use garmin_sync::schema::{Schema, Tab};
use garmin_sync::store::{CsvFolderStore, TabStore};
use garmin_sync::sync::{run_sync, SyncOptions};
use garmin_sync::SyncError;

const DATE: &str = "2024-03-01";

fn test_token() -> OAuth2Token {
    OAuth2Token {
        token_type: "Bearer".to_string(),
        access_token: "test-access-token".to_string(),
        refresh_token: "test-refresh-token".to_string(),
        expires_in: 3600,
        expires_at: chrono::Utc::now().timestamp() + 3600,
        refresh_token_expires_at: chrono::Utc::now().timestamp() + 86400,
    }
}

fn test_client(mock_server: &MockServer) -> GarminClient {
    GarminClient::new_with_base_url(&mock_server.uri()).unwrap()
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn options_for(day: u32, today: u32) -> SyncOptions {
    let mut options = SyncOptions::window(d(day), d(day));
    options.today = d(today);
    options
}

fn column(tab: Tab, header: &str) -> usize {
    Schema::v1()
        .headers(tab)
        .iter()
        .position(|h| h == header)
        .unwrap_or_else(|| panic!("no column {} in {:?}", header, tab))
}

fn activity_column(header: &str) -> usize {
    Schema::v1()
        .activity_headers()
        .iter()
        .position(|h| h == header)
        .unwrap()
}

/// Mount the full set of section endpoints for one healthy day.
async fn mount_healthy_day(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/userprofile-service/socialProfile"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "displayName": "TestUser"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/usersummary-service/usersummary/daily/TestUser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSteps": 8500,
            "activeKilocalories": 600,
            "bmrKilocalories": 1500,
            "restingHeartRate": 52,
            "averageStressLevel": 31,
            "moderateIntensityMinutes": 10,
            "vigorousIntensityMinutes": 5,
            "restStressDuration": 30000,
            "lowStressDuration": 12000,
            "mediumStressDuration": 6000,
            "highStressDuration": 600,
            "bodyBatteryHighestValue": 90,
            "bodyBatteryLowestValue": 20,
            // The upstream sometimes stringifies this count.
            "floorsAscended": "12"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/wellness-service/wellness/dailySleepData/TestUser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dailySleepDTO": {
                "sleepTimeSeconds": 25200,
                "awakeSleepSeconds": 600,
                "deepSleepSeconds": 8100,
                "lightSleepSeconds": 15300,
                "remSleepSeconds": 1800,
                "restlessMomentsCount": 12,
                "sleepNeed": {"actual": 480},
                "averageRespirationValue": 14.2,
                "averageSpO2Value": 95,
                "sleepScores": {"overall": {"value": 82}},
                "sleepStartTimestampLocal": 84_600_000i64,
                "sleepEndTimestampLocal": 109_800_000i64
            }
        })))
        .mount(server)
        .await;

    // Body composition has no data for the day.
    Mock::given(method("GET"))
        .and(path("/weight-service/weight/daterangesnapshot"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/metrics-service/metrics/trainingstatus/aggregated/{}",
            DATE
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mostRecentVO2Max": {"generic": {"vo2MaxValue": 52.5}},
            "mostRecentTrainingLoadBalance": {
                "metricsTrainingLoadBalanceDTOMap": {
                    "device-1": {"dailyTrainingLoadAcute": 412}
                }
            },
            "mostRecentTrainingStatus": {
                "latestTrainingStatusData": {
                    "device-1": {"trainingStatusFeedbackPhrase": "PRODUCTIVE_4"}
                }
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/hrv-service/hrv/{}", DATE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hrvSummary": {"lastNightAvg": 45, "status": "BALANCED"}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/bloodpressure-service/bloodpressure/range/{}/{}",
            DATE, DATE
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "measurementSummaries": [{
                "measurements": [
                    {"systolic": 120, "diastolic": 80},
                    {"systolic": 124, "diastolic": 0}
                ]
            }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/activitylist-service/activities/search/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "activityId": 101,
            "activityName": "Morning Run",
            "activityType": {"typeKey": "running"},
            "startTimeLocal": "2024-03-01 07:15:00",
            "distance": 10000.0,
            "duration": 3000.0,
            "averageHR": 150,
            "calories": 650,
            "aerobicTrainingEffect": 3.2
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/activity-service/activity/101/hrTimeInZones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"zoneNumber": 1, "secsInZone": 300},
            {"zoneNumber": 2, "secsInZone": 1200}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/usersummary-service/stats/steps/daily/{}/{}",
            DATE, DATE
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"steps": 8500}
        ])))
        .mount(server)
        .await;

    // Speed below 1.0 m/s exercises the unit-scale correction.
    Mock::given(method("GET"))
        .and(path("/biometric-service/biometric/latestLactateThreshold"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "heartRate": 168,
            "speed": 0.32
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/biometric-service/stats/lactateThreshold/range/{}/{}",
            DATE, DATE
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_sync_populates_all_tabs() {
    let server = MockServer::start().await;
    mount_healthy_day(&server).await;

    let temp = TempDir::new().unwrap();
    let mut store = CsvFolderStore::open(temp.path()).unwrap();
    let client = test_client(&server);
    let token = test_token();

    let stats = run_sync(&client, &token, &mut store, &options_for(1, 2))
        .await
        .unwrap();
    assert_eq!(stats.days_synced, 1);
    assert_eq!(stats.days_degraded, 0);
    assert_eq!(stats.tabs_failed, 0);

    // Sleep tab
    let sleep = store.read_rows(Tab::Sleep).unwrap();
    assert_eq!(sleep.len(), 2);
    let row = &sleep[1];
    assert_eq!(row[0], DATE);
    assert_eq!(row[column(Tab::Sleep, "Sleep Score")], "82");
    assert_eq!(row[column(Tab::Sleep, "Sleep Duration (min)")], "420");
    assert_eq!(row[column(Tab::Sleep, "Sleep Efficiency (%)")], "98");
    assert_eq!(row[column(Tab::Sleep, "Deep Sleep (min)")], "135");
    assert_eq!(row[column(Tab::Sleep, "Restlessness (x)")], "12");
    assert_eq!(row[column(Tab::Sleep, "Sleep Start")], "23:30");
    assert_eq!(row[column(Tab::Sleep, "Sleep End")], "06:30");
    assert_eq!(row[column(Tab::Sleep, "Overnight HRV (ms)")], "45");
    assert_eq!(row[column(Tab::Sleep, "HRV Status")], "BALANCED");

    // Stress is historical-only; the day before "today" is included.
    let stress = store.read_rows(Tab::Stress).unwrap();
    assert_eq!(stress.len(), 2);
    assert_eq!(stress[1][column(Tab::Stress, "Stress Score")], "31");
    assert_eq!(stress[1][column(Tab::Stress, "Rest Stress (min)")], "500");

    // Activity summary
    let summary = store.read_rows(Tab::ActivitySummary).unwrap();
    let row = &summary[1];
    assert_eq!(row[column(Tab::ActivitySummary, "Steps")], "8500");
    assert_eq!(row[column(Tab::ActivitySummary, "Floors Climbed")], "12");
    // moderate 10 + 2 x vigorous 5
    assert_eq!(row[column(Tab::ActivitySummary, "Intensity Minutes")], "20");
    assert_eq!(row[column(Tab::ActivitySummary, "Training Load")], "412");
    assert_eq!(row[column(Tab::ActivitySummary, "VO2 Max (Run)")], "52.5");
    assert_eq!(
        row[column(Tab::ActivitySummary, "Training Status")],
        "PRODUCTIVE_4"
    );
    assert_eq!(
        row[column(Tab::ActivitySummary, "Lactate Threshold HR")],
        "168"
    );
    // 0.32 m/s corrected to 3.2 m/s -> 312.5 s/km
    assert_eq!(
        row[column(Tab::ActivitySummary, "Lactate Threshold Pace")],
        "5:13"
    );

    // Blood pressure: zero diastolic reading excluded from the mean.
    let bp = store.read_rows(Tab::BloodPressure).unwrap();
    assert_eq!(bp[1][column(Tab::BloodPressure, "BP Systolic")], "122");
    assert_eq!(bp[1][column(Tab::BloodPressure, "BP Diastolic")], "80");

    // Body composition degraded to an empty row for the date.
    let body = store.read_rows(Tab::BodyComposition).unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[1][0], DATE);
    assert_eq!(body[1][column(Tab::BodyComposition, "Weight (kg)")], "");

    // Activities
    let acts = store.read_rows(Tab::Activities).unwrap();
    assert_eq!(acts.len(), 2);
    let row = &acts[1];
    assert_eq!(row[0], "101");
    assert_eq!(row[activity_column("Name")], "Morning Run");
    assert_eq!(row[activity_column("Time")], "07:15");
    assert_eq!(row[activity_column("Distance (km)")], "10");
    assert_eq!(row[activity_column("Duration (min)")], "50");
    assert_eq!(row[activity_column("Avg Pace (min/km)")], "5:00");
    assert_eq!(row[activity_column("Zone 1 (min)")], "5");
    assert_eq!(row[activity_column("Zone 2 (min)")], "20");
    assert_eq!(row[activity_column("Zone 3 (min)")], "0");

    // Monthly averages refreshed from the persisted rows.
    let monthly = store.read_rows(Tab::MonthlyAverages).unwrap();
    assert_eq!(monthly.len(), 2);
    assert_eq!(monthly[1][0], "2024-03");
    assert_eq!(monthly[1][column(Tab::MonthlyAverages, "Days")], "1");
}

#[tokio::test]
async fn test_resync_updates_in_place() {
    let server = MockServer::start().await;
    mount_healthy_day(&server).await;

    let temp = TempDir::new().unwrap();
    let mut store = CsvFolderStore::open(temp.path()).unwrap();
    let client = test_client(&server);
    let token = test_token();

    run_sync(&client, &token, &mut store, &options_for(1, 2))
        .await
        .unwrap();
    let stats = run_sync(&client, &token, &mut store, &options_for(1, 2))
        .await
        .unwrap();

    // Second pass rewrites rows instead of duplicating them.
    assert_eq!(stats.rows_appended, 0);
    assert!(stats.rows_updated > 0);
    assert_eq!(stats.activities_appended, 0);

    for tab in Tab::DAILY {
        assert_eq!(store.read_rows(tab).unwrap().len(), 2, "{:?}", tab);
    }
    assert_eq!(store.read_rows(Tab::Activities).unwrap().len(), 2);
    assert_eq!(store.read_rows(Tab::MonthlyAverages).unwrap().len(), 2);
}

#[tokio::test]
async fn test_live_day_kept_out_of_historical_tabs() {
    let server = MockServer::start().await;
    mount_healthy_day(&server).await;

    let temp = TempDir::new().unwrap();
    let mut store = CsvFolderStore::open(temp.path()).unwrap();
    let client = test_client(&server);
    let token = test_token();

    // The synced day is "today", so finalized tabs must skip it.
    run_sync(&client, &token, &mut store, &options_for(1, 1))
        .await
        .unwrap();

    assert_eq!(store.read_rows(Tab::Stress).unwrap().len(), 1);
    assert_eq!(store.read_rows(Tab::ActivitySummary).unwrap().len(), 1);
    assert_eq!(store.read_rows(Tab::Sleep).unwrap().len(), 2);
    assert_eq!(store.read_rows(Tab::DailySummary).unwrap().len(), 2);
}

#[tokio::test]
async fn test_whole_window_wipeout_fails_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/userprofile-service/socialProfile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "displayName": "TestUser"
        })))
        .mount(&server)
        .await;
    // Every data endpoint is missing for every day of the window.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut store = CsvFolderStore::open(temp.path()).unwrap();
    let client = test_client(&server);
    let token = test_token();

    let mut options = SyncOptions::window(d(1), d(2));
    options.today = d(3);
    let err = run_sync(&client, &token, &mut store, &options)
        .await
        .unwrap_err();
    // A run that fetched nothing anywhere must not report success.
    assert!(matches!(err, SyncError::NoData(_)));

    // The days still land, as date-only rows.
    let sleep = store.read_rows(Tab::Sleep).unwrap();
    assert_eq!(sleep.len(), 3);
    assert_eq!(sleep[1][0], DATE);
    assert_eq!(sleep[2][0], "2024-03-02");
    for cell in &sleep[1][1..] {
        assert_eq!(cell, "");
    }
}

#[tokio::test]
async fn test_unauthorized_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userprofile-service/socialProfile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut store = CsvFolderStore::open(temp.path()).unwrap();
    let client = test_client(&server);
    let token = test_token();

    let err = run_sync(&client, &token, &mut store, &options_for(1, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotAuthenticated));
    assert!(store.read_rows(Tab::Sleep).unwrap().is_empty());
}
