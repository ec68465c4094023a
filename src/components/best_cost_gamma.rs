// src/components/best_cost_gamma.rs

//! Hyperparameter selection over a summary table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;

use tracing::{debug, info};

use crate::errors::{FlowError, Result};
use crate::port::Ports;
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats};
use crate::types::ProcessState;

/// Param out-ports of [`BestCostGamma`], one per reported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BestPort {
    Cost,
    Gamma,
    Accuracy,
    Efficiency,
    Validity,
    ObsFuzzClassAvg,
    ObsFuzzOverall,
    ObsFuzzActive,
    ObsFuzzNonactive,
    ClassConfidence,
    ClassCredibility,
}

impl BestPort {
    pub const ALL: [BestPort; 11] = [
        BestPort::Cost,
        BestPort::Gamma,
        BestPort::Accuracy,
        BestPort::Efficiency,
        BestPort::Validity,
        BestPort::ObsFuzzClassAvg,
        BestPort::ObsFuzzOverall,
        BestPort::ObsFuzzActive,
        BestPort::ObsFuzzNonactive,
        BestPort::ClassConfidence,
        BestPort::ClassCredibility,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BestPort::Cost => "best_cost",
            BestPort::Gamma => "best_gamma",
            BestPort::Accuracy => "best_accuracy",
            BestPort::Efficiency => "best_eff",
            BestPort::Validity => "best_validity",
            BestPort::ObsFuzzClassAvg => "best_obsfuzz_classavg",
            BestPort::ObsFuzzOverall => "best_obsfuzz_overall",
            BestPort::ObsFuzzActive => "best_obsfuzz_active",
            BestPort::ObsFuzzNonactive => "best_obsfuzz_nonactive",
            BestPort::ClassConfidence => "best_class_confidence",
            BestPort::ClassCredibility => "best_class_credibility",
        }
    }

    /// Table column the value is read from. The class average has no column
    /// of its own.
    fn column(self) -> Option<&'static str> {
        match self {
            BestPort::Cost => Some(COST),
            BestPort::Gamma => Some(GAMMA),
            BestPort::Accuracy => Some("Accuracy"),
            BestPort::Efficiency => Some("Efficiency"),
            BestPort::Validity => Some("Validity"),
            BestPort::ObsFuzzClassAvg => None,
            BestPort::ObsFuzzOverall => Some("ObsFuzzOverall"),
            BestPort::ObsFuzzActive => Some(OBSFUZZ_ACTIVE),
            BestPort::ObsFuzzNonactive => Some(OBSFUZZ_NONACTIVE),
            BestPort::ClassConfidence => Some("ClassConfidence"),
            BestPort::ClassCredibility => Some("ClassCredibility"),
        }
    }
}

const COST: &str = "Cost";
const GAMMA: &str = "Gamma";
const OBSFUZZ_ACTIVE: &str = "ObsFuzzActive";
const OBSFUZZ_NONACTIVE: &str = "ObsFuzzNonactive";

/// Value minimized when choosing the best row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Criterion {
    /// Mean of `ObsFuzzActive` and `ObsFuzzNonactive`.
    #[default]
    ClassAverageFuzziness,
    /// Any numeric column, by header name.
    Column(String),
}

impl Criterion {
    fn columns(&self) -> Vec<&str> {
        match self {
            Criterion::ClassAverageFuzziness => vec![OBSFUZZ_ACTIVE, OBSFUZZ_NONACTIVE],
            Criterion::Column(name) => vec![name.as_str()],
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::ClassAverageFuzziness => f.write_str("class-average observed fuzziness"),
            Criterion::Column(name) => write!(f, "column '{name}'"),
        }
    }
}

/// The chosen row of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Zero-based index of the chosen data row.
    pub row: usize,
    /// Criterion value of the chosen row.
    pub score: f64,
    pub values: BTreeMap<BestPort, String>,
}

impl Selection {
    pub fn get(&self, port: BestPort) -> Option<&str> {
        self.values.get(&port).map(String::as_str)
    }
}

fn parse_f64(cell: &str, column: &str, row: usize) -> Result<f64> {
    cell.trim().parse::<f64>().map_err(|_| {
        FlowError::MalformedTable(format!(
            "row {row}: column '{column}' is not a number: '{cell}'"
        ))
    })
}

fn parse_cost(cell: &str, row: usize) -> Result<i64> {
    let raw = cell.trim();
    raw.parse().map_err(|_| {
        FlowError::MalformedTable(format!("row {row}: Cost is not an integer: '{raw}'"))
    })
}

/// Pick the row minimizing `criterion` from a tab-separated table with a
/// header row. On ties the first such row wins.
pub fn select_best<R: Read>(reader: R, criterion: &Criterion, include_gamma: bool) -> Result<Selection> {
    let mut table = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);

    let columns: HashMap<String, usize> = table
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect();
    let index_of = |name: &str| {
        columns.get(name).copied().ok_or_else(|| {
            FlowError::MalformedTable(format!("missing required column '{name}'"))
        })
    };

    let criterion_idx: Vec<usize> = criterion
        .columns()
        .into_iter()
        .map(index_of)
        .collect::<Result<_>>()?;
    let cost_idx = index_of(COST)?;
    let gamma_idx = if include_gamma {
        Some(index_of(GAMMA)?)
    } else {
        None
    };

    let mut best = f64::MAX;
    let mut best_row: Option<(usize, i64, csv::StringRecord)> = None;
    for (row, record) in table.records().enumerate() {
        let record = record?;
        let cost = parse_cost(record.get(cost_idx).unwrap_or_default(), row)?;
        if let Some(idx) = gamma_idx {
            parse_f64(record.get(idx).unwrap_or_default(), GAMMA, row)?;
        }
        let mut score = 0.0;
        for (&idx, name) in criterion_idx.iter().zip(criterion.columns()) {
            score += parse_f64(record.get(idx).unwrap_or_default(), name, row)?;
        }
        let score = score / criterion_idx.len() as f64;
        if !score.is_finite() {
            return Err(FlowError::MalformedTable(format!(
                "row {row}: criterion {criterion} is not finite: {score}"
            )));
        }
        if score < best {
            best = score;
            best_row = Some((row, cost, record));
        }
    }

    let Some((row, cost, record)) = best_row else {
        return Err(FlowError::MalformedTable(
            "table has no data rows to select from".to_string(),
        ));
    };

    let cell = |name: &str| -> Option<&str> {
        columns
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let mut values = BTreeMap::new();
    for port in BestPort::ALL {
        let value = match port {
            BestPort::Cost => cost.to_string(),
            BestPort::Gamma if !include_gamma => continue,
            BestPort::ObsFuzzClassAvg => match (cell(OBSFUZZ_ACTIVE), cell(OBSFUZZ_NONACTIVE)) {
                (Some(a), Some(n)) => {
                    let avg = (parse_f64(a, OBSFUZZ_ACTIVE, row)?
                        + parse_f64(n, OBSFUZZ_NONACTIVE, row)?)
                        / 2.0;
                    format!("{avg:.3}")
                }
                _ => String::new(),
            },
            other => {
                let Some(column) = other.column() else { continue };
                match cell(column) {
                    Some(v) => format!("{:.3}", parse_f64(v, column, row)?),
                    None if other == BestPort::Gamma => {
                        return Err(FlowError::MalformedTable(format!(
                            "row {row}: Gamma is empty"
                        )));
                    }
                    None => String::new(),
                }
            }
        };
        values.insert(port, value);
    }

    Ok(Selection {
        row,
        score: best,
        values,
    })
}

/// Reads summary tables and emits the best row's values on param ports.
///
/// One selection per received table; the out-ports carry one value per
/// table.
pub struct BestCostGamma {
    name: String,
    criterion: Criterion,
    include_gamma: bool,
    ports: Ports,
}

impl BestCostGamma {
    pub fn new(name: impl Into<String>, criterion: Criterion, include_gamma: bool) -> Result<Self> {
        let mut ports = Ports::new();
        ports.add_in_file("in")?;
        for port in BestPort::ALL {
            if port == BestPort::Gamma && !include_gamma {
                continue;
            }
            ports.add_out_param(port.name())?;
        }
        Ok(Self {
            name: name.into(),
            criterion,
            include_gamma,
            ports,
        })
    }

    async fn run_loop(mut self, ctx: ProcessContext) -> Result<ProcessStats> {
        let mut stats = ProcessStats::default();
        let Some(mut input) = self.ports.take_in_file("in") else {
            return Ok(stats);
        };
        while let Some(ip) = input.recv().await {
            let selection = {
                let _permit = ctx.acquire().await?;
                debug!(process = %self.name, path = ?ip.path(), criterion = %self.criterion, "selecting");
                let file = std::fs::File::open(ip.path())?;
                select_best(file, &self.criterion, self.include_gamma).map_err(|e| match e {
                    FlowError::MalformedTable(msg) => {
                        FlowError::MalformedTable(format!("{}: {msg}", ip.path().display()))
                    }
                    other => other,
                })?
            };
            info!(
                process = %self.name,
                row = selection.row,
                score = selection.score,
                cost = selection.get(BestPort::Cost).unwrap_or_default(),
                "best row selected"
            );
            for (port, value) in selection.values {
                self.ports.send_param(port.name(), value).await?;
            }
            stats.record(ProcessState::Computed);
        }
        Ok(stats)
    }
}

impl Process for BestCostGamma {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn describe(&self) -> String {
        format!(
            "best_cost_gamma minimizing {}{}",
            self.criterion,
            if self.include_gamma { " (with gamma)" } else { "" }
        )
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}
