//! Block layout: how one record maps onto a rectangle of cells.

use datapipe_core::{PipeError, Record};

use super::cell::Cell;

/// Axis along which consecutive blocks are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Next block is one block-width to the right.
    Horizontal,
    /// Next block is one block-height down.
    Vertical,
}

/// One field's position inside a block, relative to the block origin.
#[derive(Debug, Clone)]
pub struct FieldBlock {
    name: String,
    value_row: i64,
    value_col: i64,
    /// Title offset, also origin-relative; titles are written once, before
    /// the first block.
    title: Option<(i64, i64)>,
}

impl FieldBlock {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value_offset(&self) -> (i64, i64) {
        (self.value_row, self.value_col)
    }
}

/// Describes the rectangular cluster of cells holding one record.
#[derive(Debug, Clone)]
pub struct BlockMap {
    rows: i64,
    cols: i64,
    orientation: Orientation,
    fields: Vec<FieldBlock>,
}

impl BlockMap {
    /// An empty layout of the given extent.
    #[must_use]
    pub fn new(rows: i64, cols: i64, orientation: Orientation) -> Self {
        Self {
            rows,
            cols,
            orientation,
            fields: Vec::new(),
        }
    }

    /// Adds a field at an origin-relative offset.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, row: i64, col: i64) -> Self {
        self.fields.push(FieldBlock {
            name: name.into(),
            value_row: row,
            value_col: col,
            title: None,
        });
        self
    }

    /// Adds a field with a title cell, both origin-relative.
    #[must_use]
    pub fn titled_field(
        mut self,
        name: impl Into<String>,
        row: i64,
        col: i64,
        title_row: i64,
        title_col: i64,
    ) -> Self {
        self.fields.push(FieldBlock {
            name: name.into(),
            value_row: row,
            value_col: col,
            title: Some((title_row, title_col)),
        });
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldBlock] {
        &self.fields
    }

    #[must_use]
    pub fn has_titles(&self) -> bool {
        self.fields.iter().any(|f| f.title.is_some())
    }

    /// The next block's origin, one block extent along the orientation.
    #[must_use]
    pub fn advance(&self, origin: &dyn Cell) -> Box<dyn Cell> {
        match self.orientation {
            Orientation::Horizontal => origin.offset(0, self.cols),
            Orientation::Vertical => origin.offset(self.rows, 0),
        }
    }

    /// Writes every field's name into its title cell, relative to `origin`.
    pub fn write_titles(&self, origin: &dyn Cell) -> Result<(), PipeError> {
        for field in &self.fields {
            if let Some((row, col)) = field.title {
                origin
                    .offset(row, col)
                    .set(&field.name.as_str().into())?;
            }
        }
        Ok(())
    }

    /// Writes one record into the block at `origin`.
    ///
    /// # Errors
    ///
    /// [`PipeError::KeyNotFound`] when the record lacks a mapped field.
    pub fn write(&self, origin: &dyn Cell, record: &Record) -> Result<(), PipeError> {
        for field in &self.fields {
            let value = record.get(&field.name)?;
            origin.offset(field.value_row, field.value_col).set(&value)?;
        }
        Ok(())
    }

    /// Reads the block at `origin` into a fresh record, fields in layout
    /// order.
    pub fn read(&self, origin: &dyn Cell) -> Result<Record, PipeError> {
        let record = Record::new();
        for field in &self.fields {
            let value = origin.offset(field.value_row, field.value_col).get()?;
            record.insert(field.name.clone(), value)?;
        }
        Ok(record)
    }

    /// One cell handle per field, offset from `origin`. Used for binding
    /// write-back.
    #[must_use]
    pub fn field_cells(&self, origin: &dyn Cell) -> Vec<(String, Box<dyn Cell>)> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), origin.offset(f.value_row, f.value_col)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use datapipe_core::Value;

    use super::*;
    use crate::block::grid::GridSheet;

    fn name_age_map() -> BlockMap {
        BlockMap::new(1, 2, Orientation::Horizontal)
            .field("name", 0, 0)
            .field("age", 0, 1)
    }

    #[test]
    fn write_then_read_round_trips() {
        let sheet = GridSheet::new();
        let origin = sheet.cell(3, 3);
        let record =
            Record::from_fields([("name", Value::Text("A".into())), ("age", Value::Int(1))]);

        let map = name_age_map();
        map.write(&origin, &record).unwrap();
        assert_eq!(sheet.value(3, 3), Value::Text("A".into()));
        assert_eq!(sheet.value(3, 4), Value::Int(1));

        let back = map.read(&origin).unwrap();
        assert_eq!(back.fields(), record.fields());
    }

    #[test]
    fn advance_follows_the_orientation() {
        let sheet = GridSheet::new();
        let origin = sheet.cell(0, 0);

        let horizontal = name_age_map().advance(&origin);
        assert_eq!(horizontal.address().col, 2);
        assert_eq!(horizontal.address().row, 0);

        let vertical = BlockMap::new(4, 1, Orientation::Vertical).advance(&origin);
        assert_eq!(vertical.address().row, 4);
        assert_eq!(vertical.address().col, 0);
    }

    #[test]
    fn titles_land_at_their_offsets() {
        let sheet = GridSheet::new();
        let map = BlockMap::new(1, 2, Orientation::Vertical)
            .titled_field("name", 0, 0, -1, 0)
            .titled_field("age", 0, 1, -1, 1);

        map.write_titles(&sheet.cell(1, 0)).unwrap();
        assert_eq!(sheet.value(0, 0), Value::Text("name".into()));
        assert_eq!(sheet.value(0, 1), Value::Text("age".into()));
    }

    #[test]
    fn write_of_an_unmapped_record_is_key_not_found() {
        let sheet = GridSheet::new();
        let record = Record::from_fields([("name", Value::Text("A".into()))]);
        let err = name_age_map()
            .write(&sheet.cell(0, 0), &record)
            .unwrap_err();
        assert!(matches!(err, PipeError::KeyNotFound { name } if name == "age"));
    }
}
