use crate::config::{FeatureColumns, PipelineConfig, TrainingConfig};
use crate::csv_reader::{read_transactions, TransactionRecord};
use crate::error::DetectionError;
use crate::graph_builder::build_graph;
use crate::pipeline::run_pipeline;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_transactions() -> Vec<TransactionRecord> {
        let row = |account: &str, device: &str, ip: &str, merchant: &str, amount: f64, age: f64| {
            TransactionRecord::new(
                account,
                device,
                ip,
                merchant,
                vec![Some(amount), Some(age), Some(60.0), Some(1.0), Some(5000.0)],
            )
        };
        vec![
            row("AC001", "D01", "10.0.0.1", "M01", 120.0, 34.0),
            row("AC002", "D02", "10.0.0.2", "M01", 80.0, 45.0),
            row("AC003", "D03", "10.0.0.3", "M02", 95.0, 29.0),
            row("AC004", "D01", "10.0.0.4", "M02", 110.0, 51.0),
            row("AC005", "D04", "10.0.0.1", "M03", 9800.0, 19.0),
        ]
    }

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            training: TrainingConfig {
                epochs: 20,
                ..TrainingConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_end_to_end_example_graph() {
        let records = vec![
            TransactionRecord::new("A1", "D1", "I1", "M1", vec![Some(100.0)]),
            TransactionRecord::new("A1", "D2", "I1", "M2", vec![Some(500.0)]),
            TransactionRecord::new("A2", "D1", "I2", "M1", vec![Some(10.0)]),
        ];
        let graph = build_graph(&records, &FeatureColumns::new(["TransactionAmount"])).unwrap();

        assert_eq!(graph.node_count(), 8, "Should have 8 distinct nodes");
        assert_eq!(graph.graph.edge_count(), 8, "Duplicate A1-I1 should not add an edge");
        let a1 = graph.nodes.index_of("A1").unwrap();
        assert_eq!(graph.features[[a1, 0]], 500.0, "A1 should reflect its later record");
    }

    #[test]
    fn test_pipeline_runs() {
        let report = run_pipeline(create_test_transactions(), &quick_config()).unwrap();

        // 5 accounts, 4 devices, 4 IPs, 3 merchants
        assert_eq!(report.node_count(), 16);
        assert_eq!(report.training.epochs_run, 20);
        assert_eq!(report.training.observations.len(), 2);
        assert_eq!(report.scores.len(), 16);
        assert!(report.scores.iter().all(|s| s.is_finite() && *s >= 0.0));
        assert_eq!(report.render.nodes.len(), 16);
        assert_eq!(report.render.anomalous_count(), report.anomalies.len());
    }

    #[test]
    fn test_pipeline_features_are_standardized() {
        let report = run_pipeline(create_test_transactions(), &quick_config()).unwrap();
        let amount_column: Vec<f64> = report
            .graph
            .is_account
            .iter()
            .enumerate()
            .filter(|(_, is_account)| **is_account)
            .map(|(i, _)| report.graph.features[[i, 0]])
            .collect();
        let mean = amount_column.iter().sum::<f64>() / amount_column.len() as f64;
        assert!(mean.abs() < 1e-9, "Account amounts should be centred, got {mean}");
    }

    #[test]
    fn test_pipeline_threshold_filters() {
        let strict = run_pipeline(create_test_transactions(), &quick_config().with_threshold(1e9)).unwrap();
        assert!(strict.anomalies.is_empty(), "Nothing should exceed a huge threshold");

        let loose = run_pipeline(create_test_transactions(), &quick_config().with_threshold(-1.0)).unwrap();
        assert_eq!(loose.anomalies.len(), loose.node_count());
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let a = run_pipeline(create_test_transactions(), &quick_config()).unwrap();
        let b = run_pipeline(create_test_transactions(), &quick_config()).unwrap();
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.anomalies, b.anomalies);
    }

    #[test]
    fn test_empty_transactions() {
        let result = run_pipeline(vec![], &quick_config());
        assert!(matches!(result, Err(DetectionError::EmptyRecords)));
    }

    #[test]
    fn test_read_csv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "TransactionID,AccountID,TransactionAmount,TransactionDate,DeviceID,IP Address,MerchantID,CustomerAge,TransactionDuration,LoginAttempts,AccountBalance"
        )
        .unwrap();
        writeln!(file, "TX000001,AC00128,14.09,2023-04-11,D000380,162.198.218.92,M015,70,81,1,5112.21").unwrap();
        writeln!(file, "TX000002,AC00455,376.24,2023-06-27,D000051,13.149.61.4,M052,68,141,1,13758.91").unwrap();
        writeln!(file, "TX000003,AC00019,126.29,2023-07-10,D000235,215.97.143.157,M007,,56,1,1122.35").unwrap();

        let records = read_transactions(file.path(), &FeatureColumns::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].attributes[1], None, "Empty age should be missing");

        let report = run_pipeline(records, &quick_config()).unwrap();
        assert_eq!(report.node_count(), 12);
    }
}
