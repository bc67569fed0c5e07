use chrono::{NaiveDate, NaiveDateTime};
use claims_lens::aggregator::{monetary_summary, Availability, MonetarySummary};
use claims_lens::columns::string_values;
use claims_lens::{
    filter, AnalysisSelection, ClaimClassifier, ClaimField, ClaimsError, ClaimsPipeline,
    DatasetSchema, ProductSelection, Section, StatusCategory, ValueField,
};
use polars::prelude::*;
use std::collections::HashSet;
use std::io::Write;

fn reference_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

/// Two years of life claims, one unknown status and one unparseable date.
fn life_workbook() -> DataFrame {
    df![
        "POLIZA" => ["P01", "P02", "P03", "P04", "P05", "P06", "P07", "P08"],
        "FECHA SINIESTRO" => ["2023-01-05", "2023-01-20", "2023-02-11", "2023-03-01", "2022-12-30", "2023-04-15", "31/05/2023", "sin fecha"],
        "FECHA NOTIFICACION SINIESTRO" => [Some("2023-01-15"), Some("2023-01-25"), None, Some("2023-03-03"), Some("2023-01-02"), None, Some("2023-06-10"), None],
        "ESTADO" => ["LIQUIDADO", "LIQUIDADO", "LIQUIDADO", "PENDIENTE", "LIQUIDADO", "ANULADO", "PENDIENTE", "LIQUIDADO"],
        "BASE" => [Some("vida"), Some("VIDA"), Some("desgravamen"), Some("vida"), Some("vida"), None, None, Some("vida")],
        "VALOR ASEGURADO" => ["100", "200", "300", "50", "999", "10", "20", "30"],
        "EDAD" => ["19", "20", "85", "40", "61", "33", "72", "55"],
        "CAUSA SINIESTRO" => ["INFARTO", "ACCIDENTE", "INFARTO", "CANCER", "INFARTO", "OTROS", "CANCER", "INFARTO"],
        "PARENTESCO" => ["TITULAR", "CONYUGE", "TITULAR", "TITULAR", "HIJO", "TITULAR", "HIJO", "TITULAR"],
        "AGENCIA" => ["QUITO", "CUENCA", "QUITO", "QUITO", "QUITO", "LOJA", "CUENCA", "QUITO"],
        "ASESOR" => ["ANA", "LUIS", "ANA", "LUIS", "ANA", "ANA", "LUIS", "ANA"]
    ]
    .unwrap()
}

#[test]
fn test_settled_scenario_sum_and_mean() {
    let raw = df![
        "FECHA SINIESTRO" => ["2023-02-01", "2023-05-01", "2023-09-01"],
        "ESTADO" => ["LIQUIDADO"; 3],
        "VALOR ASEGURADO" => [100.0, 200.0, 300.0]
    ]
    .unwrap();
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&raw).unwrap();

    let output = pipeline
        .run(&table, &AnalysisSelection::new(2023), reference_time())
        .unwrap();
    let settled = output.report.settled.data().expect("settled section has data");
    assert_eq!(settled.claims, 3);
    assert_eq!(
        settled.value_summary,
        Availability::Available(MonetarySummary { count: 3, sum: 600.0, mean: Some(200.0) })
    );
    // No age column in this upload.
    assert_eq!(settled.age_bands, Availability::NotAvailable);
    assert_eq!(output.report.pending, Section::NoData);
}

#[test]
fn test_classified_subsets_are_disjoint() {
    let schema = DatasetSchema::property();
    let raw = df![
        "POLIZA" => ["A", "B", "C", "D", "E", "F"],
        "FECHA SINIESTRO" => ["2023-01-01"; 6],
        "ESTADO" => ["LIQUIDADO", "NEGADO", "EN PROCESO", "PENDIENTE DOCUMENTOS", "PENDIENTE", "CERRADO"]
    ]
    .unwrap();
    let table = ClaimsPipeline::new(schema.clone()).unwrap().load_frame(&raw).unwrap();
    let classified = ClaimClassifier::new(schema.statuses).unwrap().classify(&table).unwrap();

    let mut seen: HashSet<String> = HashSet::new();
    let mut total = 0;
    for (_, subset) in classified.iter() {
        let ids = subset.frame().column("POLIZA").unwrap();
        for id in ids.str().unwrap().into_iter().flatten() {
            assert!(seen.insert(id.to_string()), "row {} in two subsets", id);
            total += 1;
        }
    }
    assert_eq!(total, 5);
    assert!(!seen.contains("F"));
    assert_eq!(classified.get(StatusCategory::Pending).unwrap().len(), 2);
}

#[test]
fn test_full_life_report() {
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&life_workbook()).unwrap();
    let selection = AnalysisSelection::new(2023).with_top_n(3);
    let output = pipeline.run(&table, &selection, reference_time()).unwrap();
    let report = &output.report;

    // 2023 rows with a parseable incident date: P01-P04, P06, P07.
    assert_eq!(report.raw_rows, 6);

    let settled = report.settled.data().unwrap();
    assert_eq!(settled.claims, 3);
    let months: Vec<(u32, usize)> = settled.monthly_counts.iter().map(|m| (m.month, m.count)).collect();
    assert_eq!(months, vec![(1, 2), (2, 1)]);
    // (10 + 5) / 2, P03 has no notification date.
    assert_eq!(settled.mean_notification_days, Availability::Available(Some(7.5)));

    let causes = settled.top_causes.as_option().unwrap();
    assert_eq!(causes[0].category, "INFARTO");
    assert_eq!(causes[0].count, 2);

    let bands = settled.age_bands.as_option().unwrap();
    assert_eq!(bands.iter().map(|b| b.count).sum::<usize>(), 3);
    assert_eq!(bands[14].count, 1);

    let agencies = settled.agencies.as_option().unwrap();
    let labels: Vec<&str> = agencies.iter().map(|a| a.category.as_str()).collect();
    assert_eq!(labels, vec!["CUENCA", "QUITO"]);

    // Pending days counted to the reference time for the life schema.
    let pending = report.pending.data().unwrap();
    assert_eq!(pending.claims, 2);
    let days = pending.days_open.as_option().unwrap();
    assert_eq!(days, &vec![306, 215]);
    assert_eq!(pending.mean_days_open, Availability::Available(Some(260.5)));

    // The life vocabulary has no denied or in-process spellings.
    assert_eq!(report.denied, Section::NoData);
    assert_eq!(report.in_process, Section::NoData);
}

#[test]
fn test_product_selection_narrows_every_section() {
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&life_workbook()).unwrap();

    let selection = AnalysisSelection::new(2023).with_product(ProductSelection::only("Vida"));
    let output = pipeline.run(&table, &selection, reference_time()).unwrap();
    assert_eq!(output.report.raw_rows, 3);
    assert_eq!(output.report.settled.data().unwrap().claims, 2);

    let products = string_values(output.raw.frame(), ClaimField::Product).unwrap();
    assert!(products.iter().all(|p| p.as_deref() == Some("VIDA")));
}

#[test]
fn test_runs_are_idempotent() {
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&life_workbook()).unwrap();
    let selection = AnalysisSelection::new(2023);

    let first = pipeline.run(&table, &selection, reference_time()).unwrap();
    let second = pipeline.run(&table, &selection, reference_time()).unwrap();
    assert_eq!(first.report, second.report);
    assert!(first.raw.frame().equals_missing(second.raw.frame()));
}

#[test]
fn test_property_days_open_uses_notification_date() {
    let raw = df![
        "FECHA SINIESTRO" => ["2023-03-01", "2023-03-10"],
        "FECHA NOTIFICACION SINIESTRO" => [Some("2023-03-11"), None],
        "ESTADO" => ["PENDIENTE DE DOCUMENTOS", "NEGADO"],
        "VALOR INDEMNIZADO" => ["1.500,00", "0"]
    ]
    .unwrap();
    let pipeline = ClaimsPipeline::new(DatasetSchema::property()).unwrap();
    let table = pipeline.load_frame(&raw).unwrap();
    let output = pipeline
        .run(&table, &AnalysisSelection::new(2023), reference_time())
        .unwrap();

    let pending = output.report.pending.data().unwrap();
    assert_eq!(pending.days_open.as_option().unwrap(), &vec![10]);

    let denied = output.report.denied.data().unwrap();
    assert!(denied.days_open.as_option().unwrap().is_empty());
    assert_eq!(denied.mean_days_open, Availability::Available(None));
    assert_eq!(output.report.settled, Section::NoData);

    let whole = claims_lens::ClaimSubset::from_table(&table);
    let summary = monetary_summary(&whole, ValueField::IndemnifiedValue).unwrap();
    assert_eq!(summary.as_option().unwrap().sum, 1500.0);
}

#[test]
fn test_empty_year_selection_is_not_an_error() {
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&life_workbook()).unwrap();
    let subset = claims_lens::ClaimSubset::from_table(&table);

    let narrowed = filter(&subset, 2023, &ProductSelection::only("NO EXISTE")).unwrap();
    assert!(narrowed.is_empty());
    let summary = monetary_summary(&narrowed, ValueField::InsuredValue).unwrap();
    assert_eq!(summary.as_option().unwrap().sum, 0.0);
}

#[test]
fn test_year_not_in_data_rejected() {
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&life_workbook()).unwrap();
    let err = pipeline
        .run(&table, &AnalysisSelection::new(1990), reference_time())
        .unwrap_err();
    assert!(matches!(err, ClaimsError::InvalidSelection(_)));
}

#[test]
fn test_pending_days_respect_time_of_day() {
    let raw = df![
        "FECHA SINIESTRO" => ["2023-12-31 18:00:00", "2023-12-31 08:00:00"],
        "ESTADO" => ["PENDIENTE"; 2],
        "CAUSA SINIESTRO" => ["ROBO", "INFARTO"]
    ]
    .unwrap();
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&raw).unwrap();
    let output = pipeline
        .run(&table, &AnalysisSelection::new(2023), reference_time())
        .unwrap();

    // Reference is 2024-01-01 09:00: 15 hours and 25 hours elapsed.
    let pending = output.report.pending.data().unwrap();
    assert_eq!(pending.days_open.as_option().unwrap(), &vec![0, 1]);
}

#[test]
fn test_open_causes_listed_in_order_of_appearance() {
    let raw = df![
        "FECHA SINIESTRO" => ["2023-02-01"; 5],
        "ESTADO" => ["PENDIENTE"; 5],
        "CAUSA SINIESTRO" => ["ROBO", "INFARTO", "INFARTO", "CANCER", "INFARTO"]
    ]
    .unwrap();
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&raw).unwrap();
    let output = pipeline
        .run(&table, &AnalysisSelection::new(2023).with_top_n(3), reference_time())
        .unwrap();

    let pending = output.report.pending.data().unwrap();
    let causes: Vec<&str> = pending
        .causes
        .as_option()
        .unwrap()
        .iter()
        .map(|c| c.category.as_str())
        .collect();
    assert_eq!(causes, vec!["ROBO", "INFARTO", "CANCER"]);
    assert_eq!(pending.top_causes.as_option().unwrap()[0].category, "INFARTO");
}

#[test]
fn test_unknown_product_rejected() {
    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_frame(&life_workbook()).unwrap();
    let selection = AnalysisSelection::new(2023).with_product(ProductSelection::only("vidaa"));
    let err = pipeline.run(&table, &selection, reference_time()).unwrap_err();
    assert!(matches!(err, ClaimsError::InvalidSelection(_)));
}

#[test]
fn test_workbook_upload_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reclamos.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (c, header) in ["FECHA SINIESTRO", "ESTADO", "BASE", "VALOR ASEGURADO"].iter().enumerate() {
        sheet.write_string(0, c as u16, *header).unwrap();
    }
    sheet.write_string(1, 0, "2023-04-01").unwrap();
    sheet.write_string(1, 1, "LIQUIDADO").unwrap();
    sheet.write_string(1, 2, "vida").unwrap();
    sheet.write_number(1, 3, 1000.0).unwrap();
    // Serial 45047 is 2023-05-01.
    sheet.write_number(2, 0, 45047.0).unwrap();
    sheet.write_string(2, 1, "LIQUIDADO").unwrap();
    sheet.write_string(2, 2, "VIDA").unwrap();
    sheet.write_string(2, 3, "$500.00").unwrap();
    workbook.save(&path).unwrap();

    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_file(&path).unwrap();
    let output = pipeline
        .run(&table, &AnalysisSelection::new(2023), reference_time())
        .unwrap();

    let settled = output.report.settled.data().unwrap();
    assert_eq!(settled.claims, 2);
    assert_eq!(settled.value_summary.as_option().unwrap().sum, 1500.0);
    let months: Vec<u32> = settled.monthly_counts.iter().map(|m| m.month).collect();
    assert_eq!(months, vec![4, 5]);
}

#[test]
fn test_csv_upload_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reclamos.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "FECHA SINIESTRO,ESTADO,BASE,VALOR ASEGURADO,CAUSA SINIESTRO").unwrap();
    writeln!(file, "2023-04-01,LIQUIDADO,vida,\"1,000.00\",INFARTO").unwrap();
    writeln!(file, "2023-04-09,LIQUIDADO,,500,ACCIDENTE").unwrap();
    writeln!(file, "2023-05-01,PENDIENTE,vida,250,INFARTO").unwrap();
    drop(file);

    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let table = pipeline.load_file(&path).unwrap();
    let output = pipeline
        .run(&table, &AnalysisSelection::new(2023), reference_time())
        .unwrap();

    let settled = output.report.settled.data().unwrap();
    assert_eq!(settled.value_summary.as_option().unwrap().sum, 1500.0);
    assert_eq!(settled.relationships, Availability::NotAvailable);

    let json = serde_json::to_value(&output.report).unwrap();
    assert_eq!(json["settled"]["state"], "data");
    assert_eq!(json["denied"]["state"], "no_data");
    assert_eq!(json["settled"]["data"]["age_bands"]["state"], "not_available");
}

#[test]
fn test_csv_without_status_column_halts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sin_estado.csv");
    std::fs::write(&path, "FECHA SINIESTRO,BASE\n2023-01-01,VIDA\n").unwrap();

    let pipeline = ClaimsPipeline::new(DatasetSchema::life()).unwrap();
    let err = pipeline.load_file(&path).unwrap_err();
    assert!(err.is_unusable_input());
}
