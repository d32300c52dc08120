use super::{Alert, AlertRule, Comparator, RuleEngine, Severity, default_rules};
use crate::config::RuleSettings;
use crate::reading::normalize;
use crate::utils::error::RuleError;
use serde_json::json;
use std::collections::BTreeMap;

fn values(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn names(engine: &RuleEngine, pairs: &[(&str, f64)]) -> Vec<String> {
    engine
        .evaluate(&values(pairs))
        .iter()
        .map(|t| t.rule.name.clone())
        .collect()
}

#[test]
fn test_default_table() {
    let rules = default_rules();
    let table: Vec<_> = rules
        .iter()
        .map(|r| (r.name.as_str(), r.metric.as_str(), r.comparator.symbol(), r.threshold, r.severity))
        .collect();
    assert_eq!(
        table,
        vec![
            ("HIGH_TEMP", "temperature", ">", 40.0, Severity::Critical),
            ("LOW_TEMP", "temperature", "<", 0.0, Severity::Warning),
            ("LOW_HUMIDITY", "humidity", "<", 20.0, Severity::Warning),
            ("HIGH_HUMIDITY", "humidity", ">", 90.0, Severity::Warning),
            ("HIGH_WIND", "wind_speed", ">", 50.0, Severity::Warning),
            ("LOW_PRESSURE", "pressure", "<", 980.0, Severity::Warning),
            ("HIGH_PRESSURE", "pressure", ">", 1040.0, Severity::Warning),
        ]
    );
}

#[test]
fn test_high_temp_only() {
    let engine = RuleEngine::default();
    let triggered = engine.evaluate(&values(&[("temperature", 45.0), ("humidity", 50.0)]));
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].rule.name, "HIGH_TEMP");
    assert_eq!(triggered[0].rule.severity, Severity::Critical);
    assert_eq!(triggered[0].value, 45.0);
}

#[test]
fn test_multiple_rules_in_table_order() {
    let engine = RuleEngine::default();
    assert_eq!(
        names(&engine, &[("wind_speed", 60.0), ("temperature", 45.0)]),
        vec!["HIGH_TEMP", "HIGH_WIND"]
    );
    assert_eq!(
        names(&engine, &[("temperature", -3.0), ("humidity", 95.0), ("pressure", 970.0)]),
        vec!["LOW_TEMP", "HIGH_HUMIDITY", "LOW_PRESSURE"]
    );
}

#[test]
fn test_unknown_metrics_trigger_nothing() {
    let engine = RuleEngine::default();
    assert!(names(&engine, &[("rainfall", 500.0), ("uv_index", 11.0)]).is_empty());
    assert!(names(&engine, &[]).is_empty());
}

#[test]
fn test_boundaries() {
    let engine = RuleEngine::default();
    // strict comparators do not fire at the threshold
    assert!(names(&engine, &[("temperature", 40.0)]).is_empty());
    assert!(names(&engine, &[("temperature", 0.0)]).is_empty());
    assert!(names(&engine, &[("pressure", 1040.0), ("humidity", 20.0)]).is_empty());
    assert!(names(&engine, &[("temperature", f64::NAN)]).is_empty());

    assert!(Comparator::GreaterOrEqual.holds(40.0, 40.0));
    assert!(Comparator::LessOrEqual.holds(0.0, 0.0));
    assert!(!Comparator::Greater.holds(40.0, 40.0));
    assert!(!Comparator::Less.holds(0.0, 0.0));
}

#[test]
fn test_parse_comparator_and_severity() {
    assert_eq!(">=".parse::<Comparator>(), Ok(Comparator::GreaterOrEqual));
    assert_eq!(" < ".parse::<Comparator>(), Ok(Comparator::Less));
    assert_eq!(
        "==".parse::<Comparator>(),
        Err(RuleError::UnknownComparator("==".to_string()))
    );
    assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
    assert_eq!(
        "INFO".parse::<Severity>(),
        Err(RuleError::UnknownSeverity("INFO".to_string()))
    );
}

#[test]
fn test_engine_from_settings() {
    let configured = vec![RuleSettings {
        name: "FREEZING".to_string(),
        metric: "temperature".to_string(),
        comparator: "<=".to_string(),
        threshold: 0.0,
        severity: "CRITICAL".to_string(),
    }];
    let engine = RuleEngine::from_settings(Some(&configured)).unwrap();
    assert_eq!(engine.len(), 1);
    assert_eq!(names(&engine, &[("temperature", 0.0)]), vec!["FREEZING"]);

    let defaults = RuleEngine::from_settings(None).unwrap();
    assert_eq!(defaults.rules(), default_rules().as_slice());

    let broken = vec![RuleSettings {
        comparator: "!=".to_string(),
        ..configured[0].clone()
    }];
    assert!(matches!(
        RuleEngine::from_settings(Some(&broken)),
        Err(RuleError::UnknownComparator(_))
    ));

    let no_metric = vec![RuleSettings {
        metric: String::new(),
        ..configured[0].clone()
    }];
    assert_eq!(
        RuleEngine::from_settings(Some(&no_metric)).unwrap_err(),
        RuleError::EmptyMetric("FREEZING".to_string())
    );
}

#[test]
fn test_engine_rejects_metric_readings_never_carry() {
    let uv = vec![RuleSettings {
        name: "HIGH_UV".to_string(),
        metric: "uv_index".to_string(),
        comparator: ">".to_string(),
        threshold: 5.0,
        severity: "WARNING".to_string(),
    }];
    assert_eq!(
        RuleEngine::from_settings(Some(&uv)).unwrap_err(),
        RuleError::UnknownMetric {
            rule: "HIGH_UV".to_string(),
            metric: "uv_index".to_string(),
        }
    );

    let wind = vec![RuleSettings {
        metric: "wind_speed".to_string(),
        ..uv[0].clone()
    }];
    let engine = RuleEngine::from_settings(Some(&wind)).unwrap();
    let reading = normalize(&json!({
        "sensor_id": "WS_CAI_001",
        "timestamp": "2024-05-01T12:00:00Z",
        "value": { "wind_speed": 9.0 }
    }))
    .unwrap();
    assert_eq!(engine.evaluate(&reading.metrics).len(), 1);
}

#[test]
fn test_custom_rule_check() {
    let rule = AlertRule::new("X", "humidity", Comparator::GreaterOrEqual, 90.0, Severity::Warning);
    assert!(rule.check(90.0));
    assert!(!rule.check(89.99));
}

#[test]
fn test_alert_from_triggered_rule() {
    let reading = normalize(&json!({
        "sensor_id": "WS_ALX_002",
        "timestamp": "2025-07-01T13:00:00",
        "value": { "temperature": 45.126 }
    }))
    .unwrap();
    let engine = RuleEngine::default();
    let triggered = engine.evaluate(&reading.metrics);
    let alert = Alert::new(&triggered[0], &reading);

    assert_eq!(alert.rule, "HIGH_TEMP");
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.sensor_id, "WS_ALX_002");
    assert_eq!(alert.threshold, 40.0);
    assert_eq!(
        alert.message(),
        "HIGH_TEMP: Sensor WS_ALX_002 reported temperature=45.13 (threshold: 40.00) at 2025-07-01T13:00:00"
    );
}
