/// Statistics computed from text datasets (GFF peaks, line counts)
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use crate::utils::registry::StatisticsMap;


/// Arithmetic mean; `None` for an empty series.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, averaging the two middle values of an even-length series.
///
/// # Arguments
///
/// - `values`: Unsorted series.
///
/// # Returns
///
/// `None` for an empty series.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeakStats {
    pub number_of_peaks: usize,
    pub peak_mean: Option<f64>,
    pub peak_mean_std: Option<f64>,
    pub peak_median: Option<f64>,
    pub peak_median_std: Option<f64>,
    pub median_tag_singletons: Option<f64>,
}

impl PeakStats {
    pub fn to_statistics(&self) -> StatisticsMap {
        let mut map = StatisticsMap::new();
        map.insert("numberOfPeaks".to_string(), json!(self.number_of_peaks));
        map.insert("peakMean".to_string(), json!(self.peak_mean));
        map.insert("peakMeanStd".to_string(), json!(self.peak_mean_std));
        map.insert("peakMedian".to_string(), json!(self.peak_median));
        map.insert("peakMedianStd".to_string(), json!(self.peak_median_std));
        map.insert("medianTagSingletons".to_string(), json!(self.median_tag_singletons));
        map
    }
}

/// Peak statistics of a GFF file.
///
/// Column 6 is the peak score; column 9 holds `;`-separated attributes of which
/// the first `stddev=` entry is used. Peaks with a zero stddev are singletons.
pub fn peak_stats(path: &Path) -> Result<PeakStats> {
    let reader = BufReader::new(File::open(path)?);
    let mut scores = Vec::new();
    let mut stddevs = Vec::new();
    let mut singleton_scores = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let items: Vec<&str> = line.split('\t').collect();
        if items.len() < 9 {
            return Err(anyhow!("{} line {}: expected 9 GFF columns, found {}", path.display(), i + 1, items.len()));
        }
        let score: f64 = items[5]
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} line {}: invalid score {}: {}", path.display(), i + 1, items[5], e))?;
        scores.push(score);

        if let Some(attr) = items[8].split(';').map(str::trim).find(|a| a.starts_with("stddev")) {
            let value: f64 = attr
                .split('=')
                .nth(1)
                .ok_or_else(|| anyhow!("{} line {}: malformed attribute {}", path.display(), i + 1, attr))?
                .trim()
                .parse()?;
            stddevs.push(value);
            if value == 0.0 {
                singleton_scores.push(score);
            }
        }
    }

    Ok(PeakStats {
        number_of_peaks: scores.len(),
        peak_mean: mean(&scores),
        peak_mean_std: mean(&stddevs),
        peak_median: median(&scores),
        peak_median_std: median(&stddevs),
        median_tag_singletons: median(&singleton_scores),
    })
}

pub fn number_of_lines(path: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        line?;
        count += 1;
    }
    Ok(count)
}

pub fn peak_pair_wis(path: &Path) -> Result<StatisticsMap> {
    let mut map = StatisticsMap::new();
    map.insert("peakPairWis".to_string(), json!(number_of_lines(path)?));
    Ok(map)
}

/// No formula is defined for the paired-end histogram; the key is reported as null.
pub fn pe_histogram() -> StatisticsMap {
    let mut map = StatisticsMap::new();
    map.insert("peHistogram".to_string(), Value::Null);
    map
}
