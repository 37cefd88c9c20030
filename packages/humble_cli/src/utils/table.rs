use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Merge, Style};

/// Column alignment for [`Formatter`]
#[derive(Debug, Clone, Copy)]
pub enum Align {
    Left,
    Right,
    Center,
}

impl From<Align> for Alignment {
    fn from(value: Align) -> Self {
        match value {
            Align::Left => Alignment::left(),
            Align::Right => Alignment::right(),
            Align::Center => Alignment::center(),
        }
    }
}

/// psql-style table with a header row
pub struct Formatter {
    builder: Builder,
    aligns: Vec<(usize, Align)>,
    merge_vertical: bool,
    rows: usize,
}

impl Formatter {
    pub fn new<const N: usize>(headers: [&str; N]) -> Self {
        let mut builder = Builder::default();
        builder.push_record(headers);
        Self {
            builder,
            aligns: vec![],
            merge_vertical: false,
            rows: 0,
        }
    }

    pub fn align(mut self, column: usize, align: Align) -> Self {
        self.aligns.push((column, align));
        self
    }

    /// Merges repeated cells of a column into one
    pub fn merge_vertical(mut self) -> Self {
        self.merge_vertical = true;
        self
    }

    pub fn push<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builder
            .push_record(row.into_iter().map(Into::into).collect::<Vec<String>>());
        self.rows += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn render(self) -> String {
        let mut table = self.builder.build();
        table.with(Style::psql());
        for (column, align) in self.aligns {
            table.modify(Columns::single(column), Alignment::from(align));
        }
        if self.merge_vertical {
            table.with(Merge::vertical());
        }
        table.to_string()
    }
}
