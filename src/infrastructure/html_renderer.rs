// HTML/SVG renderer - one printable file per site report
use crate::application::notifier::RenderedReport;
use crate::application::report_renderer::DocumentRenderer;
use crate::domain::color::{ColorScale, Rgb};
use crate::domain::document::{Document, DocumentPage, UnitPage};
use crate::domain::error::ReportError;
use crate::domain::layout::{PageConstraints, PlannedRow};
use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use std::fmt::Write;
use std::path::Path;

const HEADER_HEIGHT: f64 = 60.0;
const HEADER_FILL: &str = "#F0F4F8";
/// Shifts the matrix block below the page centre to clear the header.
const MATRIX_OFFSET_Y: f64 = 20.0;

const LEGEND_WIDTH: f64 = 400.0;
const LEGEND_HEIGHT: f64 = 14.0;
const LEGEND_STEPS: usize = 100;
const LEGEND_MIN_TEMP: f64 = -5.0;
const LEGEND_MAX_TEMP: f64 = 60.0;

const LOGO_X: f64 = 40.0;
const LOGO_WIDTH: f64 = 80.0;
const LOGO_HEIGHT: f64 = 40.0;

/// Header image, inlined into every unit page as a data URI.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLogo {
    mime: &'static str,
    data: String,
}

impl ReportLogo {
    pub fn from_bytes(mime: &'static str, bytes: &[u8]) -> Self {
        Self {
            mime,
            data: STANDARD.encode(bytes),
        }
    }

    /// Read a PNG, JPEG or SVG file; the extension picks the MIME type.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let mime = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "svg" => "image/svg+xml",
            other => anyhow::bail!("unsupported logo format {:?} for {}", other, path.display()),
        };

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read logo {}", path.display()))?;
        Ok(Self::from_bytes(mime, &bytes))
    }

    fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

pub struct HtmlRenderer {
    constraints: PageConstraints,
    scale: ColorScale,
    logo: Option<ReportLogo>,
    author: Option<String>,
}

impl HtmlRenderer {
    pub fn new(constraints: PageConstraints, scale: ColorScale) -> Self {
        Self {
            constraints,
            scale,
            logo: None,
            author: None,
        }
    }

    pub fn with_logo(mut self, logo: Option<ReportLogo>) -> Self {
        self.logo = logo;
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    fn file_name(document: &Document) -> String {
        let title: String = document
            .title
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!(
            "Report_{}_{}.html",
            title,
            document.generated_at.format("%d-%m-%Y_%H")
        )
    }

    fn render_html(&self, document: &Document) -> Result<String, std::fmt::Error> {
        let mut out = String::with_capacity(64 * 1024);

        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html lang=\"en\"><head><meta charset=\"utf-8\">")?;
        writeln!(
            out,
            "<title>Thermal Report - {}</title>",
            html_escape::encode_text(&document.title)
        )?;
        writeln!(
            out,
            "<meta name=\"description\" content=\"Consolidated thermal monitoring - {}\">",
            html_escape::encode_double_quoted_attribute(&document.title)
        )?;
        if let Some(author) = &self.author {
            writeln!(
                out,
                "<meta name=\"author\" content=\"{}\">",
                html_escape::encode_double_quoted_attribute(author)
            )?;
        }
        writeln!(
            out,
            "<style>@page {{ size: A4 landscape; margin: 0 }} body {{ margin: 0 }} \
             svg.page {{ display: block; break-after: page; page-break-after: always }}</style>"
        )?;
        writeln!(out, "</head><body>")?;

        for page in &document.pages {
            match page {
                DocumentPage::Unit(unit) => self.render_unit_page(&mut out, unit)?,
                DocumentPage::Separator => self.render_blank_page(&mut out)?,
            }
        }

        writeln!(out, "</body></html>")?;
        Ok(out)
    }

    fn open_page(&self, out: &mut String) -> std::fmt::Result {
        let (w, h) = (self.constraints.page_width, self.constraints.page_height);
        writeln!(
            out,
            "<svg class=\"page\" xmlns=\"http://www.w3.org/2000/svg\" width=\"{w:.2}pt\" height=\"{h:.2}pt\" \
             viewBox=\"0 0 {w:.2} {h:.2}\" font-family=\"Helvetica, Arial, sans-serif\">"
        )?;
        writeln!(out, "<rect x=\"0\" y=\"0\" width=\"{w:.2}\" height=\"{h:.2}\" fill=\"#FFFFFF\"/>")
    }

    fn render_blank_page(&self, out: &mut String) -> std::fmt::Result {
        self.open_page(out)?;
        writeln!(out, "</svg>")
    }

    fn render_unit_page(&self, out: &mut String, page: &UnitPage) -> std::fmt::Result {
        let (w, h) = (self.constraints.page_width, self.constraints.page_height);
        self.open_page(out)?;

        // Header band
        writeln!(
            out,
            "<rect x=\"0\" y=\"0\" width=\"{w:.2}\" height=\"{HEADER_HEIGHT:.2}\" fill=\"{HEADER_FILL}\"/>"
        )?;
        let centre_x = w / 2.0;
        let centre_y = HEADER_HEIGHT / 2.0;
        if let Some(logo) = &self.logo {
            writeln!(
                out,
                "<image x=\"{LOGO_X:.2}\" y=\"{:.2}\" width=\"{LOGO_WIDTH:.2}\" height=\"{LOGO_HEIGHT:.2}\" \
                 preserveAspectRatio=\"xMidYMid meet\" href=\"{}\"/>",
                centre_y - LOGO_HEIGHT / 2.0,
                logo.data_uri()
            )?;
        }
        writeln!(
            out,
            "<text x=\"{centre_x:.2}\" y=\"{:.2}\" font-size=\"18\" font-weight=\"bold\" text-anchor=\"middle\">Thermal Report - {}</text>",
            centre_y,
            html_escape::encode_text(&page.description)
        )?;
        writeln!(
            out,
            "<text x=\"{centre_x:.2}\" y=\"{:.2}\" font-size=\"11\" text-anchor=\"middle\">Date: {}</text>",
            centre_y + 18.0,
            page.timestamp.format("%d/%m/%Y %H:%M")
        )?;

        let layout = &page.layout;
        let rows = layout.rows.len();
        let size = layout.cell_size;
        let row_height = layout.max_sensors as f64 * size;
        let total_height = row_height * rows as f64 + rows.saturating_sub(1) as f64 * self.constraints.row_gap;
        let top = (h - total_height) / 2.0 + MATRIX_OFFSET_Y;

        for (row_no, row) in layout.rows.iter().enumerate() {
            let row_top = top + row_no as f64 * (row_height + self.constraints.row_gap);
            self.render_row(out, row, row_top, size, layout.max_sensors, page.arcs_declared)?;
        }

        self.render_legend(out)?;
        writeln!(out, "</svg>")
    }

    fn render_row(
        &self,
        out: &mut String,
        row: &PlannedRow,
        row_top: f64,
        size: f64,
        max_sensors: usize,
        arcs_declared: bool,
    ) -> std::fmt::Result {
        let w = self.constraints.page_width;
        let x_start = (w - row.columns.len() as f64 * size) / 2.0;
        let row_height = max_sensors as f64 * size;

        // Cells, sensor 1 at the bottom of each column.
        for (position, column) in row.columns.iter().enumerate() {
            let x = x_start + position as f64 * size;
            for cell in &column.cells {
                let y = row_top + row_height - (cell.sensor_index + 1) as f64 * cell.size;
                writeln!(
                    out,
                    "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{s:.2}\" height=\"{s:.2}\" fill=\"{}\"/>",
                    cell.style.color.to_hex(),
                    s = cell.size
                )?;
                writeln!(
                    out,
                    "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"6\" font-weight=\"bold\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
                    x + cell.size / 2.0,
                    y + cell.size / 2.0,
                    html_escape::encode_text(&cell.style.text)
                )?;
            }
        }

        // Sensor labels on the left
        for sensor in 0..max_sensors {
            let y = row_top + row_height - (sensor as f64 + 0.5) * size;
            writeln!(
                out,
                "<text x=\"{:.2}\" y=\"{y:.2}\" font-size=\"7\" font-weight=\"bold\" text-anchor=\"end\" dominant-baseline=\"middle\">S{:02}</text>",
                x_start - 8.0,
                sensor + 1
            )?;
        }

        // Cable labels above the matrix
        let cable_font = (size * 0.35).clamp(4.0, 8.0);
        for (position, column) in row.columns.iter().enumerate() {
            writeln!(
                out,
                "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"{cable_font:.1}\" font-weight=\"bold\" text-anchor=\"middle\">C{:02}</text>",
                x_start + (position as f64 + 0.5) * size,
                row_top - size * 0.3,
                column.cable_index + 1
            )?;
        }

        if arcs_declared {
            for span in &row.arcs {
                let x_centre = x_start + (span.first_column as f64 + span.len as f64 / 2.0) * size;
                writeln!(
                    out,
                    "<text x=\"{x_centre:.2}\" y=\"{:.2}\" font-size=\"8\" font-weight=\"bold\" text-anchor=\"middle\">A{:02}</text>",
                    row_top - size * 1.3,
                    span.arc_index + 1
                )?;
            }
        }

        Ok(())
    }

    fn render_legend(&self, out: &mut String) -> std::fmt::Result {
        let (w, h) = (self.constraints.page_width, self.constraints.page_height);
        let x_start = (w - LEGEND_WIDTH) / 2.0;
        let bar_top = h - 30.0 - LEGEND_HEIGHT;
        let step_width = LEGEND_WIDTH / LEGEND_STEPS as f64;

        writeln!(
            out,
            "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"9\" font-weight=\"bold\" text-anchor=\"middle\">Temperature Scale</text>",
            w / 2.0,
            h - 50.0
        )?;

        for step in 0..LEGEND_STEPS {
            let fraction = step as f64 / (LEGEND_STEPS - 1) as f64;
            let temperature = LEGEND_MIN_TEMP + fraction * (LEGEND_MAX_TEMP - LEGEND_MIN_TEMP);
            let color: Rgb = self.scale.color_for_temperature(temperature);
            writeln!(
                out,
                "<rect x=\"{:.2}\" y=\"{bar_top:.2}\" width=\"{step_width:.2}\" height=\"{LEGEND_HEIGHT:.2}\" fill=\"{}\"/>",
                x_start + step as f64 * step_width,
                color.to_hex()
            )?;
        }

        let label_y = bar_top + LEGEND_HEIGHT / 2.0;
        for (x, anchor, label) in [
            (x_start - 25.0, "start", "Cold"),
            (w / 2.0, "middle", "Normal"),
            (x_start + LEGEND_WIDTH + 25.0, "end", "Critical"),
        ] {
            writeln!(
                out,
                "<text x=\"{x:.2}\" y=\"{label_y:.2}\" font-size=\"7\" text-anchor=\"{anchor}\" dominant-baseline=\"middle\">{label}</text>"
            )?;
        }

        Ok(())
    }
}

impl DocumentRenderer for HtmlRenderer {
    fn render(&self, document: &Document) -> Result<RenderedReport, ReportError> {
        let html = self
            .render_html(document)
            .map_err(|e| ReportError::Render(e.to_string()))?;

        Ok(RenderedReport {
            file_name: Self::file_name(document),
            content_type: "text/html",
            content: Bytes::from(html),
        })
    }
}
