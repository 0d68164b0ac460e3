use arrow_schema::DataType;

/// One column of a schema: name, type, the table the column originates
/// from (empty for derived columns such as alias outputs), and nullability.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub source: String,
    pub nullable: bool,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        source: impl Into<String>,
        nullable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            source: source.into(),
            nullable,
        }
    }
}

/// Ordered sequence of columns. Positional field expressions index into
/// the schema of their plan node's direct child.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Position of a column by `(source, name)`. With no source, a column
    /// without a source tag wins over an equally-named tagged one.
    pub fn index_of(&self, source: Option<&str>, name: &str) -> Option<usize> {
        match source {
            Some(src) => self
                .columns
                .iter()
                .position(|c| c.source == src && c.name == name),
            None => self
                .columns
                .iter()
                .position(|c| c.source.is_empty() && c.name == name)
                .or_else(|| self.columns.iter().position(|c| c.name == name)),
        }
    }

    /// Distinct source tags in first-appearance order. Columns without a
    /// source tag are skipped.
    pub fn sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for c in &self.columns {
            if !c.source.is_empty() && !out.contains(&c.source.as_str()) {
                out.push(&c.source);
            }
        }
        out
    }

    /// Same columns with every source tag replaced, as a subquery alias
    /// presents its inner schema.
    pub fn retagged(&self, source: &str) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data_type.clone(), source, c.nullable))
                .collect(),
        )
    }

    pub fn concat(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema::new(columns)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }
}

impl FromIterator<Column> for Schema {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        Schema::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
