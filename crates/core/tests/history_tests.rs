// ═══════════════════════════════════════════════════════════════════
// Transaction History Tests — matching modes, projections, edits
// ═══════════════════════════════════════════════════════════════════

use chrono::{NaiveDate, NaiveDateTime};
use stock_monitor_core::models::history::TransactionHistory;
use stock_monitor_core::models::price::SeriesPoint;
use stock_monitor_core::models::transaction::{broker_commission, Transaction, TransactionMatchMode};

fn dt(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// History built from `(amount, unit_price)` pairs, oldest first, one day apart.
fn history(trades: &[(i64, f64)]) -> TransactionHistory {
    let mut h = TransactionHistory::new();
    for (i, &(amount, price)) in trades.iter().enumerate() {
        h.append(amount, price, 0.0, dt(i as u32 + 1, 10));
    }
    h
}

fn amounts_and_prices(h: &TransactionHistory) -> Vec<(i64, f64)> {
    h.iter().map(|t| (t.amount, t.unit_price)).collect()
}

// ═══════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════

mod scenarios {
    use super::*;

    #[test]
    fn oldest_is_fifo() {
        let h = history(&[(100, 2.0), (200, 3.0), (300, 4.0), (-400, 3.5)]);
        let result = h.match_transactions(TransactionMatchMode::Oldest);
        assert!(result.is_complete());
        assert_eq!(amounts_and_prices(&result.remaining), vec![(200, 4.0)]);

        let bought: Vec<(i64, f64)> = result
            .sold
            .iter()
            .map(|p| (p.buy.amount, p.buy.unit_price))
            .collect();
        assert_eq!(bought, vec![(100, 2.0), (200, 3.0), (100, 4.0)]);
    }

    #[test]
    fn best_sold_out_position() {
        let h = history(&[(5, 20.0), (-5, 30.0)]);
        let result = h.match_transactions(TransactionMatchMode::Best);
        assert!(result.remaining.is_empty());
        assert_eq!(h.gain(TransactionMatchMode::Best, false), 50.0);
        assert_eq!(h.current_amount(), 0);
    }

    #[test]
    fn best_consumes_cheapest_buy() {
        let h = history(&[(10, 10.0), (5, 20.0), (-5, 30.0)]);
        let result = h.match_transactions(TransactionMatchMode::Best);
        assert_eq!(amounts_and_prices(&result.remaining), vec![(5, 20.0), (5, 10.0)]);
        assert_eq!(h.gain(TransactionMatchMode::Best, false), 100.0);
    }

    #[test]
    fn recent_profit_takes_newest_profitable_buy() {
        let h = history(&[(100, 2.0), (200, 3.0), (300, 4.0), (-100, 3.5)]);
        let recent = h.match_transactions(TransactionMatchMode::RecentProfit);
        assert_eq!(recent.remaining.current_amount(), 500);
        assert_eq!(
            amounts_and_prices(&recent.remaining),
            vec![(300, 4.0), (100, 3.0), (100, 2.0)]
        );
        assert_eq!(recent.sold[0].buy.unit_price, 3.0);

        let oldest = h.current_average(TransactionMatchMode::Oldest);
        let recent_avg = h.current_average(TransactionMatchMode::RecentProfit);
        assert_eq!(oldest.0, recent_avg.0);
        assert_ne!(oldest.1, recent_avg.1);
    }

    #[test]
    fn recent_profit_falls_back_to_best() {
        let h = history(&[(100, 5.0), (100, 4.0), (-50, 3.0)]);
        let result = h.match_transactions(TransactionMatchMode::RecentProfit);
        assert_eq!(result.sold[0].buy.unit_price, 4.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Invariants
// ═══════════════════════════════════════════════════════════════════

mod invariants {
    use super::*;

    const MODES: [TransactionMatchMode; 3] = [
        TransactionMatchMode::Oldest,
        TransactionMatchMode::Best,
        TransactionMatchMode::RecentProfit,
    ];

    fn mixed() -> TransactionHistory {
        history(&[
            (40, 10.0),
            (25, 8.0),
            (-30, 11.0),
            (60, 12.5),
            (-50, 9.0),
            (10, 7.0),
            (-20, 13.0),
        ])
    }

    #[test]
    fn amounts_are_conserved() {
        let h = mixed();
        for mode in MODES {
            let result = h.match_transactions(mode);
            assert!(result.is_complete(), "{mode}");
            let remaining = result.remaining.current_amount();
            let sold: i64 = result.sold.iter().map(|p| -p.sell.amount).sum();
            let bought: i64 = h.iter().filter(|t| t.is_buy()).map(|t| t.amount).sum();
            assert_eq!(remaining + sold, bought, "{mode}");
            assert_eq!(remaining, h.current_amount(), "{mode}");
            for pair in &result.sold {
                assert_eq!(pair.buy.amount, -pair.sell.amount);
            }
        }
    }

    #[test]
    fn best_minimises_matched_cost() {
        let h = mixed();
        let cost = |mode| -> f64 {
            h.sell_transactions(mode)
                .iter()
                .map(|p| p.buy.value())
                .sum()
        };
        let best = cost(TransactionMatchMode::Best);
        assert!(best <= cost(TransactionMatchMode::Oldest));
        assert!(best <= cost(TransactionMatchMode::RecentProfit));
    }

    #[test]
    fn matching_is_deterministic() {
        let h = mixed();
        for mode in MODES {
            let a = h.match_transactions(mode);
            let b = h.match_transactions(mode);
            assert_eq!(a.remaining, b.remaining);
            assert_eq!(a.sold, b.sold);
        }
    }

    #[test]
    fn sell_without_buys_is_reported() {
        let h = history(&[(10, 5.0), (-15, 6.0)]);
        let result = h.match_transactions(TransactionMatchMode::Best);
        assert_eq!(result.unmatched_amount, 5);
        assert!(result.check().is_err());
        assert_eq!(result.sold.len(), 1);
    }

    #[test]
    fn partial_fill_splits_commission_once() {
        let mut h = TransactionHistory::new();
        h.append(10, 10.0, 0.0, dt(1, 10));
        h.append(-5, 12.0, 0.0, dt(2, 10));
        let result = h.match_transactions(TransactionMatchMode::Best);
        let floor = broker_commission(100.0, dt(1, 10));
        assert_eq!(result.sold[0].buy.commission, floor / 2.0);
        assert_eq!(result.remaining.get(0).unwrap().commission, floor / 2.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Boundaries
// ═══════════════════════════════════════════════════════════════════

mod boundaries {
    use super::*;

    #[test]
    fn empty_history() {
        let h = TransactionHistory::new();
        assert_eq!(h.current_amount(), 0);
        assert_eq!(h.current_average(TransactionMatchMode::Best), (0, 0.0));
        assert!(h.sell_transactions(TransactionMatchMode::Oldest).is_empty());
    }

    #[test]
    fn exact_sell_closes_position() {
        let h = history(&[(100, 2.0), (-100, 2.5)]);
        assert_eq!(h.current_amount(), 0);
        assert!(h.current_transactions(TransactionMatchMode::Oldest).is_empty());
    }

    #[test]
    fn commission_floor_changes_after_2020_10_06() {
        let before = NaiveDate::from_ymd_opt(2020, 10, 6).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let after = NaiveDate::from_ymd_opt(2020, 10, 7).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(broker_commission(100.0, before), 3.0);
        assert_eq!(broker_commission(100.0, after), 5.0);
        assert!((broker_commission(-10_000.0, after) - 39.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_commission_wins() {
        let t = Transaction::new(10, 10.0, 1.5, dt(1, 10));
        assert_eq!(t.commission_value(), 1.5);
        assert_eq!(t.value_with_commission(), 101.5);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Editing
// ═══════════════════════════════════════════════════════════════════

mod editing {
    use super::*;

    #[test]
    fn add_then_rem_restores() {
        let original = history(&[(10, 5.0), (-5, 6.0)]);
        let mut h = original.clone();
        h.add(7, 4.5, 0.0, dt(9, 12), false);
        assert_eq!(h.len(), 3);
        assert!(h.rem(7, 4.5, 0.0, dt(9, 12)));
        assert_eq!(h, original);
        assert!(!h.rem(7, 4.5, 0.0, dt(9, 12)));
    }

    #[test]
    fn join_similar_merges_split_order() {
        let mut h = TransactionHistory::new();
        h.add(10, 5.0, 1.0, dt(1, 10), true);
        h.add(15, 5.0, 1.0, dt(1, 10) + chrono::Duration::minutes(3), true);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(0).unwrap().amount, 25);
        assert_eq!(h.get(0).unwrap().commission, 2.0);

        // identical transaction is ignored
        h.add(25, 5.0, 2.0, dt(1, 10), true);
        assert_eq!(h.len(), 1);

        // opposite direction is never joined
        h.add(-5, 5.0, 1.0, dt(1, 10), true);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn newest_first_order() {
        let mut h = TransactionHistory::new();
        h.append(1, 1.0, 0.0, dt(2, 10));
        h.append(2, 1.0, 0.0, dt(5, 10));
        h.append(3, 1.0, 0.0, dt(1, 10));
        let amounts: Vec<i64> = h.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![2, 1, 3]);
        assert_eq!(h.most_recent().unwrap().amount, 2);
        assert_eq!(h.oldest().unwrap().amount, 3);
    }

    #[test]
    fn split_and_find_index() {
        let h = history(&[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
        // newest first: [4, 3, 2, 1]
        let (before, after) = h.split(1, true);
        assert_eq!(after.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![4, 3]);
        assert_eq!(before.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![2, 1]);

        let (before, after) = h.split(1, false);
        assert_eq!(after.len(), 1);
        assert_eq!(before.len(), 3);

        assert_eq!(h.find_index(dt(2, 12)), Some(1));
        assert_eq!(h.find_index(dt(9, 0)), None);
    }

    #[test]
    fn group_by_day_weights_prices() {
        let mut h = TransactionHistory::new();
        h.append(10, 10.0, 1.0, dt(1, 9));
        h.append(30, 20.0, 2.0, dt(1, 15));
        h.append(-5, 25.0, 1.0, dt(1, 16));
        h.append(4, 11.0, 1.0, dt(2, 9));
        let grouped = h.group_by_day();
        assert_eq!(grouped.len(), 3);

        let day1_buy = grouped.iter().find(|t| t.time.date() == dt(1, 0).date() && t.is_buy()).unwrap();
        assert_eq!(day1_buy.amount, 40);
        assert_eq!(day1_buy.unit_price, 17.5);
        assert_eq!(day1_buy.commission, 3.0);
        assert_eq!(day1_buy.time, dt(1, 15));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Projections onto price series
// ═══════════════════════════════════════════════════════════════════

mod projections {
    use super::*;

    fn prices(days: &[(u32, f64)]) -> Vec<SeriesPoint> {
        days.iter().map(|&(d, v)| SeriesPoint::new(dt(d, 17), v)).collect()
    }

    #[test]
    fn value_history_trims_leading_zeros() {
        let mut h = TransactionHistory::new();
        h.append(10, 5.0, 0.0, dt(3, 10));
        h.append(-4, 6.0, 0.0, dt(4, 10));
        let series = prices(&[(1, 5.0), (2, 5.5), (3, 6.0), (4, 7.0), (5, 8.0)]);
        let values = h.calculate_value_history(&series);
        assert_eq!(
            values,
            vec![
                SeriesPoint::new(dt(3, 17), 60.0),
                SeriesPoint::new(dt(4, 17), 42.0),
                SeriesPoint::new(dt(5, 17), 48.0),
            ]
        );
    }

    #[test]
    fn value_history_empty_when_trades_come_later() {
        let mut h = TransactionHistory::new();
        h.append(10, 5.0, 0.0, dt(20, 10));
        let series = prices(&[(1, 5.0), (2, 5.5)]);
        assert!(h.calculate_value_history(&series).is_empty());
    }

    #[test]
    fn profit_history_nets_sell_commission() {
        let mut h = TransactionHistory::new();
        h.append(10, 10.0, 5.0, dt(1, 10));
        let series = prices(&[(1, 10.0), (2, 12.0)]);
        let profits = h.calculate_profit_history(&series, TransactionMatchMode::Best, false);
        assert_eq!(profits.len(), 2);
        // cost 105, value 120 minus the 5.0 floor commission
        assert!((profits[1].value - 10.0).abs() < 1e-9);

        let overall = h.calculate_profit_history(&series, TransactionMatchMode::Best, true);
        assert!((overall[1].value - 10.0).abs() < 1e-9);
    }

    #[test]
    fn profit_history_is_zero_before_first_trade() {
        let mut h = TransactionHistory::new();
        h.append(10, 5.0, 1.0, dt(3, 10));
        let series = prices(&[(1, 5.0), (2, 5.5), (3, 6.0), (4, 7.0)]);

        let profits = h.calculate_profit_history(&series, TransactionMatchMode::Best, false);
        let values: Vec<f64> = profits.iter().map(|p| p.value).collect();
        assert_eq!(profits.len(), 4);
        assert_eq!(profits[0].time, dt(1, 17));
        // cost 51; 60 and 70 less the 5.0 commission floor
        assert_eq!(&values[..2], &[0.0, 0.0]);
        assert!((values[2] - 4.0).abs() < 1e-9);
        assert!((values[3] - 14.0).abs() < 1e-9);
    }

    #[test]
    fn overall_profit_history_carries_realized_sells() {
        let mut h = TransactionHistory::new();
        h.append(10, 10.0, 2.0, dt(1, 10));
        h.append(-4, 15.0, 3.0, dt(3, 10));
        let series = prices(&[(2, 12.0), (3, 15.0), (4, 20.0)]);

        let held = h.calculate_profit_history(&series, TransactionMatchMode::Best, false);
        let overall = h.calculate_profit_history(&series, TransactionMatchMode::Best, true);
        let held: Vec<f64> = held.iter().map(|p| p.value).collect();
        let overall: Vec<f64> = overall.iter().map(|p| p.value).collect();

        // before the sell both views agree: 115 - 102
        assert!((held[0] - 13.0).abs() < 1e-9);
        assert!((overall[0] - 13.0).abs() < 1e-9);
        // 6 held at 10.2 against 85 and 115 net of commission
        assert!((held[1] - 23.8).abs() < 1e-9);
        assert!((held[2] - 53.8).abs() < 1e-9);
        // -102 + 57 realized on top of the held value
        assert!((overall[1] - 40.0).abs() < 1e-9);
        assert!((overall[2] - 70.0).abs() < 1e-9);
        // the gap is the realized gain of the sold slice
        assert!((overall[2] - held[2] - h.gain(TransactionMatchMode::Best, true)).abs() < 1e-9);
    }

    #[test]
    fn gain_history_coalesces_before_start() {
        let h = history(&[(10, 1.0), (-5, 2.0), (-5, 3.0)]);
        let all = h.gain_history(TransactionMatchMode::Oldest, false, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].value, 15.0);

        let from_day3 = h.gain_history(TransactionMatchMode::Oldest, false, Some(dt(3, 0)));
        assert_eq!(from_day3.len(), 2);
        assert_eq!(from_day3[0], SeriesPoint::new(dt(3, 0), 5.0));
    }
}
