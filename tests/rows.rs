use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use polymix::app::check_rows;
use polymix::error::PolymixError;
use polymix::rows::RowReader;

#[test]
fn reads_file_with_line_numbers() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("lcst.csv")).unwrap();
    fs::write(
        path.as_std_path(),
        " reference ,solvent,solvent_CAS,polymer,polymer_Mw\nref,water,7732-18-5,PNIPAM,30000\nref,water,NA,PNIPAM,\n",
    )
    .unwrap();

    let rows = RowReader::read_path(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].row.reference.as_deref(), Some("ref"));
    assert_eq!(rows[1].line, 3);
    assert_eq!(rows[1].row.solvent_cas, None);
    assert_eq!(rows[1].row.polymer_mw, None);

    let check = check_rows(&rows);
    assert_eq!(check.complete, 1);
    assert_eq!(check.incomplete[0].line, 3);
    assert_eq!(check.incomplete[0].missing, vec!["solvent_CAS"]);
}

#[test]
fn missing_file_is_reported() {
    let err = RowReader::read_path(&Utf8PathBuf::from("/definitely/not/here.csv")).unwrap_err();
    assert_matches!(err, PolymixError::CsvRead { path, .. } if path == "/definitely/not/here.csv");
}

#[test]
fn ragged_row_reports_its_line() {
    let data = "reference,solvent_CAS,polymer\nref,108-88-3,PS\nref,108-88-3\n";
    let err = RowReader::read_from(data.as_bytes(), "inline").unwrap_err();
    assert_matches!(err, PolymixError::CsvRow { line: 3, .. });
}

#[test]
fn empty_file_has_no_rows() {
    let err_or_rows = RowReader::read_from("".as_bytes(), "inline");
    assert_matches!(err_or_rows, Err(PolymixError::CsvRead { .. }));
}
