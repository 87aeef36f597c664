//! Vertical/horizontal table merge resolution.
//!
//! Parsed cells only record `gridSpan` and `vMerge`. Effective spans and
//! visibility live in a [`MergeMap`] keyed by table, row and grid column, so
//! the document tree itself is never decorated.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Block, ParsedDocument, Row, Table, TableId, VMerge};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellKey {
    pub table: TableId,
    pub row: usize,
    /// Grid column of the cell's left edge.
    pub col: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CellSpan {
    pub row_span: usize,
    pub col_span: usize,
    /// Absorbed into a merge started in an earlier row.
    pub hidden: bool,
    /// Merge state after repair: an orphan `continue` becomes `start`.
    pub effective: VMerge,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeMap {
    spans: HashMap<CellKey, CellSpan>,
}

impl MergeMap {
    pub fn get(&self, key: CellKey) -> Option<&CellSpan> {
        self.spans.get(&key)
    }

    pub fn cell(&self, table: TableId, row: usize, col: usize) -> Option<&CellSpan> {
        self.get(CellKey { table, row, col })
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Whether any visible cell of `table` spans more than one row or column.
    pub fn has_spans(&self, table: TableId) -> bool {
        self.spans
            .iter()
            .any(|(k, s)| k.table == table && !s.hidden && (s.row_span > 1 || s.col_span > 1))
    }

    pub fn entries(&self, table: TableId) -> impl Iterator<Item = (&CellKey, &CellSpan)> {
        self.spans.iter().filter(move |(k, _)| k.table == table)
    }
}

/// Grid column at which each cell of `row` starts.
pub fn grid_columns(row: &Row) -> Vec<usize> {
    let mut col = 0;
    row.cells
        .iter()
        .map(|cell| {
            let start = col;
            col += cell.col_span.max(1) as usize;
            start
        })
        .collect()
}

/// Resolves one table (not its nested tables) into `map`.
pub fn resolve_table(table: &Table, map: &mut MergeMap) {
    let mut open: HashMap<usize, CellKey> = HashMap::new();
    for (ri, row) in table.rows.iter().enumerate() {
        for (cell, col) in row.cells.iter().zip(grid_columns(row)) {
            let col_span = cell.col_span.max(1) as usize;
            let key = CellKey {
                table: table.id,
                row: ri,
                col,
            };
            for covered in col + 1..col + col_span {
                open.remove(&covered);
            }

            let span = match cell.v_merge {
                VMerge::Continue => match open.get(&col).copied() {
                    Some(head) => {
                        if let Some(head_span) = map.spans.get_mut(&head) {
                            head_span.row_span += 1;
                        }
                        CellSpan {
                            row_span: 1,
                            col_span,
                            hidden: true,
                            effective: VMerge::Continue,
                        }
                    }
                    None => {
                        log::debug!(
                            "table {}: row {ri} col {col} continues no merge, treating as start",
                            table.id.0
                        );
                        open.insert(col, key);
                        CellSpan {
                            row_span: 1,
                            col_span,
                            hidden: false,
                            effective: VMerge::Start,
                        }
                    }
                },
                VMerge::Start => {
                    open.insert(col, key);
                    CellSpan {
                        row_span: 1,
                        col_span,
                        hidden: false,
                        effective: VMerge::Start,
                    }
                }
                VMerge::None => {
                    open.remove(&col);
                    CellSpan {
                        row_span: 1,
                        col_span,
                        hidden: false,
                        effective: VMerge::None,
                    }
                }
            };
            map.spans.insert(key, span);
        }
    }
}

fn resolve_blocks(blocks: &[Block], map: &mut MergeMap) {
    for block in blocks {
        if let Block::Table(table) = block {
            resolve_table(table, map);
            for cell in table.rows.iter().flat_map(|r| r.cells.iter()) {
                resolve_blocks(&cell.blocks, map);
            }
        }
    }
}

/// Computes spans for every table in the body, headers, footers and notes,
/// including nested tables.
pub fn resolve_merges(doc: &ParsedDocument) -> MergeMap {
    let mut map = MergeMap::default();
    resolve_blocks(&doc.blocks, &mut map);
    for hf in doc.headers.variants.values().chain(doc.footers.variants.values()) {
        resolve_blocks(&hf.blocks, &mut map);
    }
    for note in &doc.notes {
        resolve_blocks(&note.blocks, &mut map);
    }
    map
}

/// The immutable tree both renderers consume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedDocument {
    pub doc: ParsedDocument,
    pub merges: MergeMap,
}

impl ResolvedDocument {
    pub fn new(doc: ParsedDocument) -> Self {
        let merges = resolve_merges(&doc);
        Self { doc, merges }
    }
}
