// tests/select_best_props.rs

use proptest::prelude::*;

use scidag::components::{BestPort, Criterion, select_best};

fn table(rows: &[(i64, u8)]) -> String {
    let mut s = String::from("Gene\tEfficiency\tCost\n");
    for (cost, eff) in rows {
        s.push_str(&format!("G\t{}\t{cost}\n", f64::from(*eff) / 10.0));
    }
    s
}

/// Index of the first row holding the smallest value.
fn first_minimum(rows: &[(i64, u8)]) -> usize {
    let mut best = 0;
    for (i, (_, eff)) in rows.iter().enumerate() {
        if eff < &rows[best].1 {
            best = i;
        }
    }
    best
}

proptest! {
    #[test]
    fn selects_first_row_with_minimal_criterion(
        rows in prop::collection::vec((1i64..10_000, 0u8..10), 1..25)
    ) {
        let tsv = table(&rows);
        let selection = select_best(
            tsv.as_bytes(),
            &Criterion::Column("Efficiency".into()),
            false,
        ).unwrap();

        let expected = first_minimum(&rows);
        prop_assert_eq!(selection.row, expected);
        let cost = rows[expected].0.to_string();
        prop_assert_eq!(selection.get(BestPort::Cost), Some(cost.as_str()));
        let eff = format!("{:.3}", f64::from(rows[expected].1) / 10.0);
        prop_assert_eq!(selection.get(BestPort::Efficiency), Some(eff.as_str()));
        prop_assert_eq!(selection.get(BestPort::Gamma), None);
    }

    #[test]
    fn row_order_only_matters_for_ties(
        rows in prop::collection::vec((1i64..10_000, 0u8..10), 1..25)
    ) {
        let mut reversed = rows.clone();
        reversed.reverse();
        let criterion = Criterion::Column("Efficiency".into());

        let forward = select_best(table(&rows).as_bytes(), &criterion, false).unwrap();
        let backward = select_best(table(&reversed).as_bytes(), &criterion, false).unwrap();
        prop_assert_eq!(forward.score, backward.score);
    }
}
