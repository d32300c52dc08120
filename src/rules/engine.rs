use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::RuleSettings;
use crate::reading::METRIC_KEYS;
use crate::utils::error::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl Comparator {
    /// Strict for `>`/`<`, inclusive for `>=`/`<=`. NaN never matches.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Greater => value > threshold,
            Comparator::Less => value < threshold,
            Comparator::GreaterOrEqual => value >= threshold,
            Comparator::LessOrEqual => value <= threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Greater => ">",
            Comparator::Less => "<",
            Comparator::GreaterOrEqual => ">=",
            Comparator::LessOrEqual => "<=",
        }
    }
}

impl FromStr for Comparator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparator::Greater),
            "<" => Ok(Comparator::Less),
            ">=" => Ok(Comparator::GreaterOrEqual),
            "<=" => Ok(Comparator::LessOrEqual),
            other => Err(RuleError::UnknownComparator(other.to_string())),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Severity {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(RuleError::UnknownSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub name: String,
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub severity: Severity,
}

impl AlertRule {
    pub fn new(name: &str, metric: &str, comparator: Comparator, threshold: f64, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            metric: metric.to_string(),
            comparator,
            threshold,
            severity,
        }
    }

    pub fn check(&self, value: f64) -> bool {
        self.comparator.holds(value, self.threshold)
    }
}

impl TryFrom<&RuleSettings> for AlertRule {
    type Error = RuleError;

    fn try_from(settings: &RuleSettings) -> Result<Self, Self::Error> {
        if settings.metric.trim().is_empty() {
            return Err(RuleError::EmptyMetric(settings.name.clone()));
        }
        if !METRIC_KEYS.contains(&settings.metric.as_str()) {
            return Err(RuleError::UnknownMetric {
                rule: settings.name.clone(),
                metric: settings.metric.clone(),
            });
        }
        Ok(Self {
            name: settings.name.clone(),
            metric: settings.metric.clone(),
            comparator: settings.comparator.parse()?,
            threshold: settings.threshold,
            severity: settings.severity.parse()?,
        })
    }
}

/// The stock rule table.
pub fn default_rules() -> Vec<AlertRule> {
    use Comparator::{Greater, Less};
    use Severity::{Critical, Warning};

    vec![
        AlertRule::new("HIGH_TEMP", "temperature", Greater, 40.0, Critical),
        AlertRule::new("LOW_TEMP", "temperature", Less, 0.0, Warning),
        AlertRule::new("LOW_HUMIDITY", "humidity", Less, 20.0, Warning),
        AlertRule::new("HIGH_HUMIDITY", "humidity", Greater, 90.0, Warning),
        AlertRule::new("HIGH_WIND", "wind_speed", Greater, 50.0, Warning),
        AlertRule::new("LOW_PRESSURE", "pressure", Less, 980.0, Warning),
        AlertRule::new("HIGH_PRESSURE", "pressure", Greater, 1040.0, Warning),
    ]
}

/// A rule that fired, with the value that fired it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triggered<'a> {
    pub rule: &'a AlertRule,
    pub value: f64,
}

/// Immutable rule table. Built once at consumer startup.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<AlertRule>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RuleEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self { rules }
    }

    /// Build from configured rules, or the stock table when none are configured.
    pub fn from_settings(rules: Option<&[RuleSettings]>) -> Result<Self, RuleError> {
        match rules {
            Some(rules) => rules
                .iter()
                .map(AlertRule::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::new),
            None => Ok(Self::default()),
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule whose comparison holds, in table order.
    pub fn evaluate(&self, values: &BTreeMap<String, f64>) -> Vec<Triggered<'_>> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let value = *values.get(&rule.metric)?;
                rule.check(value).then_some(Triggered { rule, value })
            })
            .collect()
    }
}
