// Layout planner - packs cable columns onto fixed-size report pages
//
// Arcs are kept whole on a page and within a row whenever they fit. The only
// splits are an arc larger than a page (chunked into page-sized pages) and an
// arc larger than a row (spills from row 1 into row 2).
use crate::domain::color::{CellStyle, ColorScale};
use crate::domain::error::ReportError;
use crate::domain::geometry::UnitGeometry;
use serde::Deserialize;

/// Page geometry in points, plus the packing limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageConstraints {
    pub page_width: f64,
    pub page_height: f64,
    pub margin_x: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub row_gap: f64,
    pub max_cell_size: f64,
    pub min_cell_size: f64,
    pub max_cables_per_row: usize,
    pub max_rows_per_page: usize,
}

impl Default for PageConstraints {
    fn default() -> Self {
        // A4 landscape
        Self {
            page_width: 841.89,
            page_height: 595.28,
            margin_x: 80.0,
            margin_top: 110.0,
            margin_bottom: 70.0,
            row_gap: 40.0,
            max_cell_size: 25.0,
            min_cell_size: 8.0,
            max_cables_per_row: 36,
            max_rows_per_page: 2,
        }
    }
}

impl PageConstraints {
    fn cables_per_row(&self) -> usize {
        self.max_cables_per_row.max(1)
    }

    fn rows_per_page(&self) -> usize {
        self.max_rows_per_page.clamp(1, 2)
    }

    pub fn cables_per_page(&self) -> usize {
        self.cables_per_row() * self.rows_per_page()
    }

    fn available_width(&self) -> f64 {
        self.page_width - 2.0 * self.margin_x
    }

    fn available_height(&self) -> f64 {
        self.page_height - self.margin_top - self.margin_bottom
    }

    fn cell_size(&self, rows: usize, max_sensors: usize, widest_row: usize) -> f64 {
        let rows_f = rows as f64;
        let vertical = (self.available_height() - (rows_f - 1.0) * self.row_gap)
            / (max_sensors as f64 * rows_f);
        let horizontal = self.available_width() / widest_row as f64;

        vertical
            .min(horizontal)
            .min(self.max_cell_size)
            .max(self.min_cell_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub sensor_index: usize,
    pub size: f64,
    pub style: CellStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CableColumn {
    /// Position of the cable within the unit, zero based.
    pub cable_index: usize,
    pub cells: Vec<Cell>,
}

/// Where one arc (or the part of it on this row) sits within a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcSpan {
    pub arc_index: usize,
    pub first_column: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRow {
    pub columns: Vec<CableColumn>,
    pub arcs: Vec<ArcSpan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPage {
    pub rows: Vec<PlannedRow>,
    pub cell_size: f64,
    pub max_sensors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub pages: Vec<PlannedPage>,
}

/// A run of cables belonging to one arc.
#[derive(Debug, Clone)]
struct Group {
    arc_index: usize,
    cables: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct LayoutPlanner {
    constraints: PageConstraints,
    scale: ColorScale,
}

impl LayoutPlanner {
    pub fn new(constraints: PageConstraints, scale: ColorScale) -> Self {
        Self { constraints, scale }
    }

    pub fn plan(
        &self,
        unit_id: &str,
        geometry: &UnitGeometry,
        values: &[i32],
    ) -> Result<LayoutPlan, ReportError> {
        if geometry.cables.is_empty() {
            return Err(ReportError::geometry(unit_id, "no cables declared"));
        }
        if values.is_empty() {
            return Err(ReportError::geometry(unit_id, "reading has no sensor values"));
        }
        if geometry.total_sensors() == 0 {
            return Err(ReportError::geometry(unit_id, "every cable has zero sensors"));
        }

        let columns = split_columns(&geometry.cables, values);

        let groups: Vec<Group> = geometry
            .arc_groups()
            .into_iter()
            .enumerate()
            .map(|(arc_index, range)| Group {
                arc_index,
                cables: range.collect(),
            })
            .collect();

        let mut pages = Vec::new();
        for page_groups in pack_pages(groups, self.constraints.cables_per_page()) {
            let rows = pack_rows(page_groups, self.constraints.cables_per_row());
            pages.push(self.plan_page(rows, &geometry.cables, &columns)?);
        }

        Ok(LayoutPlan { pages })
    }

    fn plan_page(
        &self,
        rows: Vec<Vec<Group>>,
        cable_lengths: &[usize],
        columns: &[&[i32]],
    ) -> Result<PlannedPage, ReportError> {
        let max_sensors = rows
            .iter()
            .flatten()
            .flat_map(|g| g.cables.iter())
            .map(|&cable| cable_lengths[cable])
            .max()
            .unwrap_or(0)
            .max(1);
        let widest_row = rows
            .iter()
            .map(|row| row.iter().map(|g| g.cables.len()).sum::<usize>())
            .max()
            .unwrap_or(1)
            .max(1);

        let cell_size = self.constraints.cell_size(rows.len(), max_sensors, widest_row);

        let mut planned_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut planned = PlannedRow {
                columns: Vec::new(),
                arcs: Vec::new(),
            };

            for group in row {
                planned.arcs.push(ArcSpan {
                    arc_index: group.arc_index,
                    first_column: planned.columns.len(),
                    len: group.cables.len(),
                });

                for cable_index in group.cables {
                    let cells = columns[cable_index]
                        .iter()
                        .enumerate()
                        .map(|(sensor_index, &code)| {
                            Ok(Cell {
                                sensor_index,
                                size: cell_size,
                                style: self.scale.resolve(code)?,
                            })
                        })
                        .collect::<Result<Vec<_>, ReportError>>()?;

                    planned.columns.push(CableColumn { cable_index, cells });
                }
            }

            planned_rows.push(planned);
        }

        Ok(PlannedPage {
            rows: planned_rows,
            cell_size,
            max_sensors,
        })
    }
}

/// Cut the flat value vector into per-cable slices. A short vector leaves the
/// trailing cables partially filled or empty.
fn split_columns<'a>(cable_lengths: &[usize], values: &'a [i32]) -> Vec<&'a [i32]> {
    let mut columns = Vec::with_capacity(cable_lengths.len());
    let mut offset = 0;
    for &len in cable_lengths {
        let start = offset.min(values.len());
        let end = (offset + len).min(values.len());
        columns.push(&values[start..end]);
        offset += len;
    }
    columns
}

fn pack_pages(groups: Vec<Group>, capacity: usize) -> Vec<Vec<Group>> {
    let mut pages = Vec::new();
    let mut current: Vec<Group> = Vec::new();
    let mut used = 0;

    for group in groups {
        let len = group.cables.len();

        if len > capacity {
            if !current.is_empty() {
                pages.push(std::mem::take(&mut current));
                used = 0;
            }
            for chunk in group.cables.chunks(capacity) {
                pages.push(vec![Group {
                    arc_index: group.arc_index,
                    cables: chunk.to_vec(),
                }]);
            }
            continue;
        }

        if used + len > capacity && !current.is_empty() {
            pages.push(std::mem::take(&mut current));
            used = 0;
        }

        used += len;
        current.push(group);
    }

    if !current.is_empty() {
        pages.push(current);
    }

    pages
}

/// Split one page's groups into at most two rows. Once a group overflows row
/// 1, every later group goes to row 2 so arc order is preserved.
fn pack_rows(groups: Vec<Group>, row_capacity: usize) -> Vec<Vec<Group>> {
    let mut first: Vec<Group> = Vec::new();
    let mut second: Vec<Group> = Vec::new();
    let mut first_len = 0;
    let mut first_closed = false;

    for group in groups {
        let len = group.cables.len();

        if first_closed {
            second.push(group);
            continue;
        }

        if len > row_capacity {
            let room = row_capacity - first_len;
            let (head, tail) = group.cables.split_at(room);
            if !head.is_empty() {
                first.push(Group {
                    arc_index: group.arc_index,
                    cables: head.to_vec(),
                });
            }
            if !tail.is_empty() {
                second.push(Group {
                    arc_index: group.arc_index,
                    cables: tail.to_vec(),
                });
            }
            first_closed = true;
            continue;
        }

        if first_len + len <= row_capacity {
            first_len += len;
            first.push(group);
        } else {
            first_closed = true;
            second.push(group);
        }
    }

    [first, second]
        .into_iter()
        .filter(|row| !row.is_empty())
        .collect()
}
