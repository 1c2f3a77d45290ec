//! Inventory projector - labelled LCI tables, one amount column per FU

use serde::{Deserialize, Serialize};

use crate::calc::driver::LcaResults;
use crate::core::error::{check_index, CalcError};
use crate::core::frame::{Cell, Frame};
use crate::core::identity::FlowKey;
use crate::core::metadata::MetaDataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InventoryKind {
    /// Elementary flows `g`
    #[default]
    Biosphere,
    /// Technosphere flows, supply times production amount
    Technosphere,
}

impl InventoryKind {
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            InventoryKind::Biosphere => &["name", "categories", "type", "unit", "database", "code"],
            InventoryKind::Technosphere => {
                &["reference product", "name", "location", "unit", "database", "code"]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryOptions {
    /// Drop rows whose amounts are all zero
    pub remove_zeros: bool,
    /// Biosphere only: keep flows characterized by a loaded method
    pub characterized_only: bool,
}

#[derive(Debug, Clone)]
pub struct InventoryFrame {
    pub kind: InventoryKind,
    pub keys: Vec<FlowKey>,
    pub metadata: Vec<Vec<String>>,
    /// Functional-unit labels
    pub columns: Vec<String>,
    /// `values[row][fu]`; NaN where the solve failed
    pub values: Vec<Vec<f64>>,
}

impl InventoryFrame {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn amount(&self, key: &FlowKey, fu: usize) -> Option<f64> {
        let row = self.keys.iter().position(|k| k == key)?;
        self.values[row].get(fu).copied()
    }

    pub fn to_frame(&self) -> Frame {
        let fields = self.kind.fields();
        let title = match self.kind {
            InventoryKind::Biosphere => "biosphere inventory",
            InventoryKind::Technosphere => "technosphere inventory",
        };
        let columns = fields
            .iter()
            .map(|f| f.to_string())
            .chain(self.columns.iter().cloned());
        let mut frame = Frame::new(title, columns);
        for (meta, values) in self.metadata.iter().zip(&self.values) {
            let mut row: Vec<Cell> = meta.iter().map(|m| Cell::from(m.as_str())).collect();
            row.extend(values.iter().map(|v| Cell::from(*v)));
            frame.push_row(row);
        }
        frame
    }
}

/// Project the solved vectors of `scenario` into an inventory table
pub fn inventory(
    results: &LcaResults,
    metadata: &MetaDataStore,
    kind: InventoryKind,
    scenario: usize,
    options: InventoryOptions,
) -> Result<InventoryFrame, CalcError> {
    let (n_fu, _, n_scenario) = results.cube.shape();
    check_index("scenario", scenario, n_scenario)?;

    let keys = match kind {
        InventoryKind::Biosphere => &results.flows,
        InventoryKind::Technosphere => &results.activities,
    };
    let columns_by_fu: Vec<Option<Vec<f64>>> = (0..n_fu)
        .map(|i| match kind {
            InventoryKind::Biosphere => results.inventory(i, scenario).map(<[f64]>::to_vec),
            InventoryKind::Technosphere => results.technosphere_flows(i, scenario),
        })
        .collect();
    let characterized = results.characterized_flows();

    let mut frame = InventoryFrame {
        kind,
        keys: Vec::new(),
        metadata: Vec::new(),
        columns: results.cube.fu_labels.clone(),
        values: Vec::new(),
    };
    for (r, key) in keys.iter().enumerate() {
        if options.characterized_only
            && kind == InventoryKind::Biosphere
            && !characterized.get(r).copied().unwrap_or(false)
        {
            continue;
        }
        let values: Vec<f64> = columns_by_fu
            .iter()
            .map(|col| col.as_ref().map(|c| c[r]).unwrap_or(f64::NAN))
            .collect();
        if options.remove_zeros && values.iter().all(|v| *v == 0.0) {
            continue;
        }
        frame.keys.push(key.clone());
        frame.metadata.push(
            kind.fields()
                .iter()
                .map(|f| metadata.field(key, f))
                .collect(),
        );
        frame.values.push(values);
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::driver::build_results;
    use crate::calc::engine::MatrixEngine;
    use crate::calc::setup::resolve_setup;
    use crate::core::identity::MethodKey;
    use crate::core::progress::Checkpoint;
    use crate::core::store::MemoryStore;
    use crate::entities::{Activity, CalculationSetup, Database, Exchange, ExchangeType, Method};

    fn key(code: &str) -> FlowKey {
        FlowKey::new("db", code)
    }

    fn flow(code: &str) -> Activity {
        let mut act = Activity::new("db", code, code);
        act.kind = "emission".into();
        act.categories = vec!["air".into()];
        act
    }

    fn results() -> (LcaResults, MetaDataStore) {
        let mut store = MemoryStore::new();
        let mut db = Database::new("db");
        db.activities.push(
            Activity::new("db", "a", "A")
                .with_exchange(Exchange::new(key("b"), 0.5, ExchangeType::Technosphere))
                .with_exchange(Exchange::new(key("co2"), 1.0, ExchangeType::Biosphere)),
        );
        db.activities.push(
            Activity::new("db", "b", "B")
                .with_exchange(Exchange::new(key("ch4"), 2.0, ExchangeType::Biosphere)),
        );
        db.activities.push(flow("co2"));
        db.activities.push(flow("ch4"));
        db.activities.push(flow("n2o"));
        store.add_database(db);
        store.add_method(Method::new(MethodKey::new(["GWP"]), "kg").with_cf(key("co2"), 1.0));
        store.add_setup(
            CalculationSetup::new("s")
                .with_fu(key("a"), 1.0)
                .with_method(MethodKey::new(["GWP"])),
        );
        let setup = resolve_setup(&store, "s", None).unwrap();
        let metadata = setup.metadata();
        let mut engine = MatrixEngine::build(&setup).unwrap();
        let results = build_results(&mut engine, &setup, &metadata, &mut Checkpoint::none()).unwrap();
        (results, metadata)
    }

    #[test]
    fn test_biosphere_inventory() {
        let (results, metadata) = results();
        let inv = inventory(&results, &metadata, InventoryKind::Biosphere, 0, InventoryOptions::default())
            .unwrap();
        assert_eq!(inv.len(), 3);
        assert_eq!(inv.amount(&key("co2"), 0), Some(1.0));
        assert_eq!(inv.amount(&key("ch4"), 0), Some(1.0));
        assert_eq!(inv.amount(&key("n2o"), 0), Some(0.0));
    }

    #[test]
    fn test_filters() {
        let (results, metadata) = results();
        let options = InventoryOptions {
            remove_zeros: true,
            characterized_only: false,
        };
        let inv = inventory(&results, &metadata, InventoryKind::Biosphere, 0, options).unwrap();
        assert_eq!(inv.len(), 2);

        let options = InventoryOptions {
            remove_zeros: false,
            characterized_only: true,
        };
        let inv = inventory(&results, &metadata, InventoryKind::Biosphere, 0, options).unwrap();
        assert_eq!(inv.keys, vec![key("co2")]);
    }

    #[test]
    fn test_technosphere_inventory_frame() {
        let (results, metadata) = results();
        let inv = inventory(&results, &metadata, InventoryKind::Technosphere, 0, InventoryOptions::default())
            .unwrap();
        assert_eq!(inv.amount(&key("b"), 0), Some(0.5));
        let frame = inv.to_frame();
        assert_eq!(frame.columns[..2], ["reference product".to_string(), "name".to_string()]);
        assert_eq!(frame.get(0, "name").map(|c| c.render(None)), Some("A".to_string()));
        assert!(inventory(&results, &metadata, InventoryKind::Technosphere, 3, InventoryOptions::default()).is_err());
    }
}
