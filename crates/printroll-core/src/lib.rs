use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CM_PER_INCH: f64 = 2.54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Immutable inputs of the row packer, all in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutParams {
    pub canvas_width: u32,
    pub padding: u32,
    /// Not used by the packer itself; photos are resized to it before packing.
    pub target_photo_size: u32,
}

/// A closed horizontal band of the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    /// Indices into the packed sequence, left to right.
    pub members: Vec<usize>,
    pub height: u32,
    /// Member widths plus interior padding.
    pub content_width: u32,
}

impl Row {
    /// Left edge of the first member. Rows narrower than the canvas are centered.
    pub fn x_offset(&self, params: &LayoutParams) -> u32 {
        if self.content_width < params.canvas_width {
            (params.canvas_width - self.content_width) / 2
        } else {
            params.padding
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub index: usize,
    pub row: usize,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPlan {
    pub canvas_width: u32,
    pub total_height: u32,
    pub padding: u32,
    /// Informational estimate only; rows are packed by running width.
    pub photos_per_row: u32,
    pub rows: Vec<Row>,
    /// One entry per input image, in input order.
    pub placements: Vec<Placement>,
}

/// Advisory count of photos per row, based on the widest image.
pub fn photos_per_row_estimate(sizes: &[ImageSize], params: &LayoutParams) -> u32 {
    let max_width = sizes.iter().map(|s| s.width).max().unwrap_or(0);
    let available = params.canvas_width.saturating_add(params.padding);
    let per_photo = max_width.saturating_add(params.padding);
    if per_photo == 0 {
        return 1;
    }
    (available / per_photo).max(1)
}

/// Greedy first-fit row assignment. Order is preserved and rows are closed
/// as soon as the next image does not fit; an image wider than the canvas
/// still gets a row of its own.
pub fn pack_rows(sizes: &[ImageSize], params: &LayoutParams) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut members: Vec<usize> = Vec::new();
    let mut row_width: u32 = 0;
    let mut row_height: u32 = 0;

    for (index, size) in sizes.iter().enumerate() {
        let needed = row_width
            .saturating_add(params.padding)
            .saturating_add(size.width);
        if !members.is_empty() && needed > params.canvas_width {
            rows.push(Row {
                members: std::mem::take(&mut members),
                height: row_height,
                content_width: row_width,
            });
            members.push(index);
            row_width = size.width;
            row_height = size.height;
        } else {
            if !members.is_empty() {
                row_width = row_width.saturating_add(params.padding);
            }
            members.push(index);
            row_width = row_width.saturating_add(size.width);
            row_height = row_height.max(size.height);
        }
    }

    if !members.is_empty() {
        rows.push(Row {
            members,
            height: row_height,
            content_width: row_width,
        });
    }
    rows
}

pub fn total_height(rows: &[Row], padding: u32) -> u32 {
    rows.iter().fold(padding, |acc, row| {
        acc.saturating_add(row.height).saturating_add(padding)
    })
}

/// Computes rows, canvas height and placements. `None` when there is nothing to lay out.
pub fn plan_layout(sizes: &[ImageSize], params: &LayoutParams) -> Option<LayoutPlan> {
    if sizes.is_empty() {
        return None;
    }

    let rows = pack_rows(sizes, params);
    let mut placements = Vec::with_capacity(sizes.len());
    let mut y_offset = params.padding;
    for (row_index, row) in rows.iter().enumerate() {
        let mut x = row.x_offset(params);
        for &index in &row.members {
            let size = sizes[index];
            placements.push(Placement {
                index,
                row: row_index,
                x,
                y: y_offset + (row.height - size.height) / 2,
            });
            x = x.saturating_add(size.width).saturating_add(params.padding);
        }
        y_offset = y_offset
            .saturating_add(row.height)
            .saturating_add(params.padding);
    }

    Some(LayoutPlan {
        canvas_width: params.canvas_width,
        total_height: total_height(&rows, params.padding),
        padding: params.padding,
        photos_per_row: photos_per_row_estimate(sizes, params),
        rows,
        placements,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintEstimate {
    pub length_cm: f64,
    pub cost: f64,
}

pub fn estimate_print(total_height: u32, dpi: u32, rate_per_meter: f64) -> PrintEstimate {
    let length_cm = total_height as f64 * CM_PER_INCH / dpi as f64;
    PrintEstimate {
        length_cm,
        cost: (length_cm / 100.0) * rate_per_meter,
    }
}

/// Pixel width of a roll, truncated.
pub fn canvas_width_px(roll_width_cm: f64, dpi: u32) -> u32 {
    (roll_width_cm * dpi as f64 / CM_PER_INCH) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub roll_width_cm: f64,
    /// Takes precedence over `roll_width_cm` when set.
    pub canvas_width_px: Option<u32>,
    pub dpi: u32,
    pub padding: u32,
    pub target_photo_size: u32,
    pub quality: u8,
    pub rate_per_meter: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            roll_width_cm: 90.0,
            canvas_width_px: None,
            dpi: 300,
            padding: 20,
            target_photo_size: 800,
            quality: 95,
            rate_per_meter: 15.0,
        }
    }
}

impl LayoutConfig {
    pub fn canvas_width(&self) -> u32 {
        self.canvas_width_px
            .unwrap_or_else(|| canvas_width_px(self.roll_width_cm, self.dpi))
    }

    pub fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            canvas_width: self.canvas_width(),
            padding: self.padding,
            target_photo_size: self.target_photo_size,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.dpi == 0 {
            return Err(CoreError::InvalidConfig("dpi must be positive".to_string()));
        }
        // JFIF stores the density as a 16-bit value.
        if self.dpi > u32::from(u16::MAX) {
            return Err(CoreError::InvalidConfig(format!(
                "dpi must be at most {} (got {})",
                u16::MAX,
                self.dpi
            )));
        }
        if self.target_photo_size == 0 {
            return Err(CoreError::InvalidConfig(
                "target photo size must be positive".to_string(),
            ));
        }
        if self.canvas_width_px.is_none()
            && !(self.roll_width_cm.is_finite() && self.roll_width_cm > 0.0)
        {
            return Err(CoreError::InvalidConfig(format!(
                "roll width must be a positive number of centimeters (got {})",
                self.roll_width_cm
            )));
        }
        if self.canvas_width() == 0 {
            return Err(CoreError::InvalidConfig("canvas width is zero pixels".to_string()));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(CoreError::InvalidConfig(format!(
                "quality must be within 1..=100 (got {})",
                self.quality
            )));
        }
        if !(self.rate_per_meter.is_finite() && self.rate_per_meter >= 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "rate per meter must be a non-negative number (got {})",
                self.rate_per_meter
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutOverrides {
    pub roll_width_cm: Option<f64>,
    pub canvas_width_px: Option<u32>,
    pub dpi: Option<u32>,
    pub padding: Option<u32>,
    pub target_photo_size: Option<u32>,
    pub quality: Option<u8>,
    pub rate_per_meter: Option<f64>,
}

pub fn resolve_layout_config(base: LayoutConfig, overrides: LayoutOverrides) -> LayoutConfig {
    let mut cfg = base;
    if let Some(roll_width_cm) = overrides.roll_width_cm {
        cfg.roll_width_cm = roll_width_cm;
        // An explicit roll width wins over a pixel width inherited from a file.
        cfg.canvas_width_px = None;
    }
    if overrides.canvas_width_px.is_some() {
        cfg.canvas_width_px = overrides.canvas_width_px;
    }
    if let Some(dpi) = overrides.dpi {
        cfg.dpi = dpi;
    }
    if let Some(padding) = overrides.padding {
        cfg.padding = padding;
    }
    if let Some(size) = overrides.target_photo_size {
        cfg.target_photo_size = size;
    }
    if let Some(quality) = overrides.quality {
        cfg.quality = quality;
    }
    if let Some(rate) = overrides.rate_per_meter {
        cfg.rate_per_meter = rate;
    }
    cfg
}

/// Reads a JSON config document; missing fields keep their defaults.
pub fn load_layout_config(path: &Path) -> Result<LayoutConfig, CoreError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("input directory '{}' does not exist", .0.display())]
    InputNotFound(PathBuf),
    #[error("input path '{}' is not a directory", .0.display())]
    InputNotDirectory(PathBuf),
    #[error("no photos found in '{}'", .0.display())]
    EmptyInput(PathBuf),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    InputNotFound,
    InputNotDirectory,
    EmptyInput,
    InvalidConfig,
    Io,
    ConfigParse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl CoreError {
    /// Clean no-op outcomes: the run stops without producing output.
    pub fn is_empty_outcome(&self) -> bool {
        matches!(self, Self::InputNotFound(_) | Self::EmptyInput(_))
    }

    pub fn as_error_info(&self) -> ErrorInfo {
        let code = match self {
            Self::InputNotFound(_) => ErrorCode::InputNotFound,
            Self::InputNotDirectory(_) => ErrorCode::InputNotDirectory,
            Self::EmptyInput(_) => ErrorCode::EmptyInput,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::Io(_) => ErrorCode::Io,
            Self::Json(_) => ErrorCode::ConfigParse,
        };
        ErrorInfo {
            code,
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(canvas_width: u32, padding: u32) -> LayoutParams {
        LayoutParams {
            canvas_width,
            padding,
            target_photo_size: 800,
        }
    }

    fn sizes(dims: &[(u32, u32)]) -> Vec<ImageSize> {
        dims.iter().map(|&(w, h)| ImageSize::new(w, h)).collect()
    }

    #[test]
    fn three_wide_photos_split_into_two_rows() {
        let input = sizes(&[(400, 300), (400, 300), (400, 300)]);
        let plan = plan_layout(&input, &params(1000, 20)).expect("plan should exist");
        assert_eq!(plan.rows.len(), 2);
        assert_eq!(plan.rows[0].members, vec![0, 1]);
        assert_eq!(plan.rows[1].members, vec![2]);
        assert_eq!(plan.rows[0].height, 300);
        assert_eq!(plan.rows[1].height, 300);
        assert_eq!(plan.total_height, 660);
    }

    #[test]
    fn empty_input_has_no_plan() {
        assert!(plan_layout(&[], &params(1000, 20)).is_none());
    }

    #[test]
    fn oversized_photo_gets_its_own_row() {
        let input = sizes(&[(200, 100), (1500, 400), (200, 100)]);
        let p = params(1000, 20);
        let plan = plan_layout(&input, &p).expect("plan should exist");
        assert_eq!(plan.rows.len(), 3);
        assert_eq!(plan.rows[1].members, vec![1]);
        assert_eq!(plan.rows[1].content_width, 1500);
        assert_eq!(plan.rows[1].x_offset(&p), 20);
        assert_eq!(plan.placements[1].x, 20);
    }

    #[test]
    fn oversized_first_photo_does_not_leave_an_empty_row() {
        let input = sizes(&[(1200, 100)]);
        let plan = plan_layout(&input, &params(1000, 20)).expect("plan should exist");
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.total_height, 20 + 100 + 20);
    }

    #[test]
    fn rows_stay_within_canvas_when_photos_fit() {
        let p = params(1000, 20);
        let input = sizes(&[
            (300, 200),
            (450, 120),
            (90, 400),
            (500, 500),
            (960, 10),
            (10, 10),
            (700, 300),
            (250, 250),
            (240, 240),
        ]);
        let plan = plan_layout(&input, &p).expect("plan should exist");
        for row in &plan.rows {
            let recomputed: u32 = row.members.iter().map(|&i| input[i].width).sum::<u32>()
                + p.padding * (row.members.len() as u32 - 1);
            assert_eq!(recomputed, row.content_width);
            assert!(row.content_width <= p.canvas_width);
        }
        let covered: Vec<usize> = plan.rows.iter().flat_map(|r| r.members.clone()).collect();
        assert_eq!(covered, (0..input.len()).collect::<Vec<_>>());
    }

    #[test]
    fn total_height_matches_row_sum() {
        let p = params(800, 15);
        let input = sizes(&[(300, 200), (300, 250), (300, 100), (700, 90), (80, 60)]);
        let plan = plan_layout(&input, &p).expect("plan should exist");
        let expected = p.padding + plan.rows.iter().map(|r| r.height + p.padding).sum::<u32>();
        assert_eq!(plan.total_height, expected);
        assert_eq!(plan.rows.len(), 3);
        assert_eq!(plan.rows[0].height, 250);
        assert_eq!(plan.rows[1].height, 100);
        assert_eq!(plan.rows[2].height, 90);
    }

    #[test]
    fn partial_rows_are_centered_and_full_rows_start_at_padding() {
        let p = params(1000, 20);
        let input = sizes(&[(490, 100), (490, 100), (301, 50)]);
        let plan = plan_layout(&input, &p).expect("plan should exist");
        assert_eq!(plan.rows[0].content_width, 1000);
        assert_eq!(plan.placements[0].x, 20);
        assert_eq!(plan.placements[1].x, 20 + 490 + 20);
        // (1000 - 301) / 2 floors to 349
        assert_eq!(plan.placements[2].x, 349);
    }

    #[test]
    fn shorter_photos_are_vertically_centered() {
        let input = sizes(&[(100, 300), (100, 101)]);
        let plan = plan_layout(&input, &params(1000, 20)).expect("plan should exist");
        assert_eq!(plan.placements[0].y, 20);
        assert_eq!(plan.placements[1].y, 20 + 99);
        assert_eq!(plan.placements[0].x, (1000 - 220) / 2);
    }

    #[test]
    fn second_row_starts_below_first_row_and_padding() {
        let input = sizes(&[(600, 300), (600, 200)]);
        let plan = plan_layout(&input, &params(1000, 20)).expect("plan should exist");
        assert_eq!(plan.placements[1].row, 1);
        assert_eq!(plan.placements[1].y, 20 + 300 + 20);
    }

    #[test]
    fn photos_per_row_is_advisory() {
        let p = params(1000, 20);
        let input = sizes(&[(600, 100), (100, 100), (100, 100), (100, 100)]);
        assert_eq!(photos_per_row_estimate(&input, &p), 1);
        let plan = plan_layout(&input, &p).expect("plan should exist");
        assert_eq!(plan.photos_per_row, 1);
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0].members.len(), 4);
    }

    #[test]
    fn photos_per_row_counts_widest_photo() {
        let input = sizes(&[(400, 300), (200, 300)]);
        assert_eq!(photos_per_row_estimate(&input, &params(1000, 20)), 2);
        assert_eq!(photos_per_row_estimate(&input, &params(100, 0)), 1);
    }

    #[test]
    fn estimate_converts_pixels_to_length_and_cost() {
        let estimate = estimate_print(3000, 300, 15.0);
        assert!((estimate.length_cm - 25.4).abs() < 1e-9);
        assert!((estimate.cost - 3.81).abs() < 1e-9);
    }

    #[test]
    fn default_roll_width_truncates_to_pixels() {
        assert_eq!(canvas_width_px(90.0, 300), 10629);
        assert_eq!(LayoutConfig::default().canvas_width(), 10629);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let base = LayoutConfig {
            canvas_width_px: Some(4000),
            ..LayoutConfig::default()
        };
        let cfg = resolve_layout_config(
            base.clone(),
            LayoutOverrides {
                padding: Some(5),
                ..LayoutOverrides::default()
            },
        );
        assert_eq!(cfg.padding, 5);
        assert_eq!(cfg.canvas_width(), 4000);
        assert_eq!(cfg.dpi, 300);

        let cfg = resolve_layout_config(
            base,
            LayoutOverrides {
                roll_width_cm: Some(50.0),
                dpi: Some(100),
                ..LayoutOverrides::default()
            },
        );
        assert_eq!(cfg.canvas_width(), 1968);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        assert!(LayoutConfig::default().validate().is_ok());
        let bad = [
            LayoutConfig { dpi: 0, ..LayoutConfig::default() },
            LayoutConfig { dpi: 70_000, ..LayoutConfig::default() },
            LayoutConfig { target_photo_size: 0, ..LayoutConfig::default() },
            LayoutConfig { roll_width_cm: -1.0, ..LayoutConfig::default() },
            LayoutConfig { roll_width_cm: 0.001, ..LayoutConfig::default() },
            LayoutConfig { quality: 0, ..LayoutConfig::default() },
            LayoutConfig { quality: 101, ..LayoutConfig::default() },
            LayoutConfig { rate_per_meter: f64::NAN, ..LayoutConfig::default() },
        ];
        for cfg in bad {
            let err = cfg.validate().expect_err("config should be rejected");
            assert_eq!(err.as_error_info().code, ErrorCode::InvalidConfig);
        }
    }

    #[test]
    fn partial_config_document_keeps_defaults() {
        let cfg: LayoutConfig =
            serde_json::from_str(r#"{"padding": 40, "canvasWidthPx": 2000}"#).expect("config should parse");
        assert_eq!(cfg.padding, 40);
        assert_eq!(cfg.canvas_width(), 2000);
        assert_eq!(cfg.quality, 95);
    }

    #[test]
    fn empty_outcomes_are_not_failures() {
        assert!(CoreError::EmptyInput(PathBuf::from("photos")).is_empty_outcome());
        assert!(CoreError::InputNotFound(PathBuf::from("photos")).is_empty_outcome());
        assert!(!CoreError::InvalidConfig("x".to_string()).is_empty_outcome());
        assert!(!CoreError::InputNotDirectory(PathBuf::from("photo.jpg")).is_empty_outcome());
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!CoreError::from(denied).is_empty_outcome());
    }

    #[test]
    fn highest_jfif_density_is_accepted() {
        let cfg = LayoutConfig {
            dpi: u32::from(u16::MAX),
            canvas_width_px: Some(1000),
            ..LayoutConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
