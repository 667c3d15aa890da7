use std::fmt;
use std::marker::PhantomData;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::field::Field;
use crate::filter::Filter;
use crate::value::NumericType;

/// Output key of a `count` reducer given no fields.
pub const COUNT_ALIAS: &str = "count";

/// How a group's identity is derived from the key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum GroupType {
    /// Group by the field's raw value.
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    path: String,
    strategy: GroupType,
}

impl GroupKey {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn strategy(&self) -> GroupType {
        self.strategy
    }

    /// The `_id` expression of the group stage.
    fn to_bson(&self) -> Bson {
        match self.strategy {
            GroupType::Single => Bson::String(format!("${}", self.path)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReducerKind {
    Count,
    Sum,
    Average,
    Min,
    Max,
}

impl ReducerKind {
    pub fn name(self) -> &'static str {
        match self {
            ReducerKind::Count => "count",
            ReducerKind::Sum => "sum",
            ReducerKind::Average => "average",
            ReducerKind::Min => "min",
            ReducerKind::Max => "max",
        }
    }

    /// Group-stage accumulator reading `reference` (a `$path`).
    fn accumulator(self, reference: String) -> Document {
        match self {
            ReducerKind::Count => doc! {
                "$sum": { "$cond": [{ "$gt": [reference, Bson::Null] }, 1, 0] }
            },
            ReducerKind::Sum => doc! { "$sum": reference },
            ReducerKind::Average => doc! { "$avg": reference },
            ReducerKind::Min => doc! { "$min": reference },
            ReducerKind::Max => doc! { "$max": reference },
        }
    }
}

// ── Reducer fields ──────────────────────────────────────────────

/// One reducer input: a field, the key its result is published under, and an
/// optional numeric re-typing of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerField {
    path: String,
    alias: Option<String>,
    convert: Option<NumericType>,
}

impl ReducerField {
    pub fn alias(&mut self, name: impl Into<String>) -> &mut Self {
        self.alias = Some(name.into());
        self
    }

    pub fn convert(&mut self, target: NumericType) -> &mut Self {
        self.convert = Some(target);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The key the result is published under: the declared alias, or the
    /// field path with `.` replaced by `_` when none was given. Group output
    /// names cannot contain `.`.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.path.replace('.', "_"),
        }
    }

    pub fn conversion(&self) -> Option<NumericType> {
        self.convert
    }
}

/// Collects the fields a reducer runs over.
pub struct ReducerScope<O> {
    fields: Vec<ReducerField>,
    _owner: PhantomData<fn() -> O>,
}

impl<O> ReducerScope<O> {
    pub fn field<V>(&mut self, field: &Field<O, V>) -> &mut ReducerField {
        self.fields.push(ReducerField {
            path: field.path().to_string(),
            alias: None,
            convert: None,
        });
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }
}

// ── Stages ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Group(Document),
    Project(Document),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Group(_) => "$group",
            Stage::Project(_) => "$project",
        }
    }

    pub fn body(&self) -> &Document {
        match self {
            Stage::Match(d) | Stage::Group(d) | Stage::Project(d) => d,
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(self.name(), self.body().clone());
        doc
    }
}

// ── Phases ──────────────────────────────────────────────────────

/// A filter with a grouping key attached; accepts exactly one reducer.
pub struct Grouped<O> {
    filter: Filter<O>,
    key: GroupKey,
}

/// A finished stage sequence. No further reducers can be chained.
pub struct Aggregation<O> {
    stages: Vec<Stage>,
    aliases: Vec<String>,
    kind: ReducerKind,
    grouped: bool,
    _owner: PhantomData<fn() -> O>,
}

impl<O> Filter<O> {
    pub fn group<V>(self, field: &Field<O, V>, strategy: GroupType) -> Grouped<O> {
        Grouped {
            filter: self,
            key: GroupKey {
                path: field.path().to_string(),
                strategy,
            },
        }
    }

    pub fn count<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self, None, ReducerKind::Count, block)
    }

    pub fn sum<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self, None, ReducerKind::Sum, block)
    }

    pub fn average<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self, None, ReducerKind::Average, block)
    }

    pub fn min<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self, None, ReducerKind::Min, block)
    }

    pub fn max<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self, None, ReducerKind::Max, block)
    }
}

impl<O> Grouped<O> {
    pub fn filter(&self) -> &Filter<O> {
        &self.filter
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn count<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self.filter, Some(self.key), ReducerKind::Count, block)
    }

    pub fn sum<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self.filter, Some(self.key), ReducerKind::Sum, block)
    }

    pub fn average<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self.filter, Some(self.key), ReducerKind::Average, block)
    }

    pub fn min<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self.filter, Some(self.key), ReducerKind::Min, block)
    }

    pub fn max<R>(
        self,
        block: impl FnOnce(&mut ReducerScope<O>) -> R,
    ) -> Result<Aggregation<O>, Error> {
        reduce(self.filter, Some(self.key), ReducerKind::Max, block)
    }
}

fn reduce<O, R>(
    filter: Filter<O>,
    key: Option<GroupKey>,
    kind: ReducerKind,
    block: impl FnOnce(&mut ReducerScope<O>) -> R,
) -> Result<Aggregation<O>, Error> {
    let mut scope = ReducerScope {
        fields: Vec::new(),
        _owner: PhantomData,
    };
    block(&mut scope);

    let grouped = key.is_some();
    let mut group = Document::new();
    group.insert("_id", key.as_ref().map_or(Bson::Null, GroupKey::to_bson));
    let mut project = Document::new();
    project.insert("_id", if grouped { 1 } else { 0 });
    let mut aliases: Vec<String> = Vec::new();

    if scope.fields.is_empty() {
        if kind != ReducerKind::Count {
            return Err(Error::NoReducerFields(kind.name()));
        }
        group.insert(COUNT_ALIAS, doc! { "$sum": 1 });
        project.insert(COUNT_ALIAS, 1);
        aliases.push(COUNT_ALIAS.to_string());
    }

    for field in &scope.fields {
        let alias = field.output_name();
        if alias.is_empty() || alias.contains('.') || alias.starts_with('$') {
            return Err(Error::InvalidAlias(alias));
        }
        if alias == "_id" || aliases.contains(&alias) {
            return Err(Error::DuplicateAlias(alias));
        }

        group.insert(alias.clone(), kind.accumulator(format!("${}", field.path)));
        let output = match field.convert {
            Some(target) => {
                let mut conversion = Document::new();
                conversion.insert(target.operator(), format!("${alias}"));
                Bson::Document(conversion)
            }
            None => Bson::Int32(1),
        };
        project.insert(alias.clone(), output);
        aliases.push(alias);
    }

    debug!(?kind, grouped, outputs = aliases.len(), "aggregation built");

    Ok(Aggregation {
        stages: vec![
            Stage::Match(filter.to_document()),
            Stage::Group(group),
            Stage::Project(project),
        ],
        aliases,
        kind,
        grouped,
        _owner: PhantomData,
    })
}

impl<O> Aggregation<O> {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Output keys, in declaration order.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn kind(&self) -> ReducerKind {
        self.kind
    }

    /// Whether results carry the group key in `_id`.
    pub fn is_grouped(&self) -> bool {
        self.grouped
    }

    pub fn to_pipeline(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}

impl<O> fmt::Debug for Aggregation<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregation")
            .field("stages", &self.stages)
            .field("aliases", &self.aliases)
            .field("kind", &self.kind)
            .field("grouped", &self.grouped)
            .finish()
    }
}

impl<O> Clone for Grouped<O> {
    fn clone(&self) -> Self {
        Grouped {
            filter: self.filter.clone(),
            key: self.key.clone(),
        }
    }
}

impl<O> fmt::Debug for Grouped<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grouped")
            .field("filter", &self.filter)
            .field("key", &self.key)
            .finish()
    }
}
