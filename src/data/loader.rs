use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDateTime;
use log::debug;

use super::model::{CellValue, RawTable};
use crate::config::SourceDatasetConfig;
use crate::error::{PipelineError, Result};

/// Name of the first output column.
pub const DATE_COLUMN: &str = "Date";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Read one dataset out of a local export. Dispatch by extension.
///
/// Supported formats:
/// * `.xlsx` / `.xlsm` / `.xlsb` / `.xls` / `.ods` – the dataset's named sheet
/// * `.csv` – a single-sheet export; the sheet name is ignored
///
/// The result has a `Date` column followed by the dataset's hour labels.
pub fn load_workbook(path: &Path, config: &SourceDatasetConfig) -> Result<RawTable> {
    let location = path.display().to_string();
    std::fs::metadata(path).map_err(|e| PipelineError::unavailable(&location, e))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let grid = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_sheet_grid(path, &config.sheet)?,
        "csv" => read_csv_grid(path)?,
        other => {
            return Err(PipelineError::parse(
                &location,
                format!("unsupported file extension: .{other}"),
            ))
        }
    };

    let table = project(&location, grid, config)?;
    debug!(
        "{location}: read {} row(s) for dataset '{}'",
        table.len(),
        config.id
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Workbook reader
// ---------------------------------------------------------------------------

/// The named sheet as a dense grid anchored at cell A1.
fn read_sheet_grid(path: &Path, sheet: &str) -> Result<Vec<Vec<CellValue>>> {
    let location = path.display().to_string();
    let mut workbook = open_workbook_auto(path).map_err(|e| match e {
        calamine::Error::Io(io) => PipelineError::unavailable(&location, io),
        other => PipelineError::parse(&location, format!("opening workbook: {other}")),
    })?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| PipelineError::parse(&location, format!("sheet '{sheet}': {e}")))?;

    // `Range` only covers the used area; positions below are absolute.
    let Some((last_row, last_col)) = range.end() else {
        return Ok(Vec::new());
    };
    let grid = (0..=last_row)
        .map(|r| {
            (0..=last_col)
                .map(|c| range.get_value((r, c)).map(cell_from_data).unwrap_or(CellValue::Empty))
                .collect()
        })
        .collect();
    Ok(grid)
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from_text(s),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => CellValue::DateTime(naive),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(CellValue::DateTime)
            .unwrap_or_else(|_| CellValue::from_text(s)),
        Data::DurationIso(s) => CellValue::from_text(s),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

/// CSV layout: no header handling here; every record is a grid row.
/// Completely empty lines are skipped by the reader and do not count
/// towards `header_row`.
fn read_csv_grid(path: &Path) -> Result<Vec<Vec<CellValue>>> {
    let location = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| PipelineError::unavailable(&location, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut grid = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            if e.is_io_error() {
                PipelineError::unavailable(&location, e)
            } else {
                PipelineError::parse(&location, format!("CSV row {row_no}: {e}"))
            }
        })?;
        grid.push(record.iter().map(CellValue::from_text).collect());
    }
    Ok(grid)
}

// ---------------------------------------------------------------------------
// Shape checks shared by both readers
// ---------------------------------------------------------------------------

/// Keep the configured columns below the header row and rename them to
/// `Date` + hour labels.
fn project(
    location: &str,
    grid: Vec<Vec<CellValue>>,
    config: &SourceDatasetConfig,
) -> Result<RawTable> {
    if config.columns.len() != config.hour_labels.len() + 1 {
        return Err(PipelineError::parse(
            location,
            format!(
                "dataset '{}' keeps {} columns but expects {} hour labels plus a date",
                config.id,
                config.columns.len(),
                config.hour_labels.len()
            ),
        ));
    }

    let header_row = config.header_row as usize;
    let Some(header) = grid.get(header_row) else {
        return Err(PipelineError::parse(
            location,
            format!(
                "header row {header_row} is past the end of the sheet ({} rows)",
                grid.len()
            ),
        ));
    };

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    if let Some(col) = config.columns.iter().find(|&&c| c as usize >= width) {
        return Err(PipelineError::parse(
            location,
            format!("column {col} is past the sheet width ({width} columns)"),
        ));
    }

    let header_blank = config
        .columns
        .iter()
        .all(|&c| header.get(c as usize).map_or(true, CellValue::is_empty));
    if header_blank {
        return Err(PipelineError::parse(
            location,
            format!("header row {header_row} is blank for the retained columns"),
        ));
    }

    let columns = std::iter::once(DATE_COLUMN.to_string())
        .chain(config.hour_labels.iter().cloned())
        .collect();

    let rows = grid
        .iter()
        .skip(header_row + 1)
        .map(|row| {
            config
                .columns
                .iter()
                .map(|&c| row.get(c as usize).cloned().unwrap_or(CellValue::Empty))
                .collect()
        })
        .collect();

    Ok(RawTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn config() -> SourceDatasetConfig {
        SourceDatasetConfig {
            id: "treated".to_string(),
            sheet: "ignored".to_string(),
            header_row: 1,
            columns: vec![0, 2, 3],
            max_value: 1.0,
            hour_labels: vec!["08:00".to_string(), "24:00".to_string()],
        }
    }

    fn write_csv(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn csv_export_is_projected() {
        let file = write_csv(
            "Lab report,,,\n\
             Data,Obs,08:00,24:00\n\
             01/01/2024,x,\"<0,45\",0\n\
             ,,\"0,2\",\n",
        );
        let table = load_workbook(file.path(), &config()).unwrap();
        assert_eq!(table.columns, vec!["Date", "08:00", "24:00"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], CellValue::Text("01/01/2024".to_string()));
        assert_eq!(table.rows[0][1], CellValue::Text("<0,45".to_string()));
        assert_eq!(table.rows[1][0], CellValue::Empty);
    }

    #[test]
    fn missing_header_row_is_a_parse_error() {
        let file = write_csv("Data,Obs,08:00,24:00\n");
        let mut cfg = config();
        cfg.header_row = 5;
        assert!(matches!(
            load_workbook(file.path(), &cfg),
            Err(PipelineError::Parse { .. })
        ));
    }

    #[test]
    fn narrow_sheet_is_a_parse_error() {
        let file = write_csv("x,y\nData,08:00\n");
        assert!(matches!(
            load_workbook(file.path(), &config()),
            Err(PipelineError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.csv");
        assert!(matches!(
            load_workbook(&path, &config()),
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_a_parse_error() {
        let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(matches!(
            load_workbook(file.path(), &config()),
            Err(PipelineError::Parse { .. })
        ));
    }

    const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

    /// Minimal one-sheet `.xlsx` named "Tratada". The used area starts at
    /// B2, the date cell is a serial with a built-in date format.
    fn write_xlsx(dir: &Path) -> std::path::PathBuf {
        let workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Tratada" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        );
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;
        let styles = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="{MAIN_NS}"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs></styleSheet>"#
        );
        let strings = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="{MAIN_NS}" count="6" uniqueCount="6">
<si><t>Relatório</t></si><si><t>Data</t></si><si><t>Obs</t></si>
<si><t>08:00</t></si><si><t>24:00</t></si><si><t>&lt;0,30</t></si></sst>"#
        );
        let sheet = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="{MAIN_NS}"><sheetData>
<row r="2"><c r="B2" t="s"><v>0</v></c></row>
<row r="3"><c r="B3" t="s"><v>1</v></c><c r="C3" t="s"><v>2</v></c><c r="D3" t="s"><v>3</v></c><c r="E3" t="s"><v>4</v></c></row>
<row r="4"><c r="B4" s="1"><v>45292</v></c><c r="C4"><v>99</v></c><c r="D4" t="s"><v>5</v></c><c r="E4"><v>0.4</v></c></row>
<row r="5"><c r="D5"><v>0.5</v></c></row>
</sheetData></worksheet>"#
        );
        let content_types = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;
        let root_rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

        let path = dir.join("lab.xlsx");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        let parts: [(&str, &str); 7] = [
            ("[Content_Types].xml", content_types),
            ("_rels/.rels", root_rels),
            ("xl/workbook.xml", &workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/styles.xml", &styles),
            ("xl/sharedStrings.xml", &strings),
            ("xl/worksheets/sheet1.xml", &sheet),
        ];
        for (name, body) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn xlsx_config() -> SourceDatasetConfig {
        SourceDatasetConfig {
            sheet: "Tratada".to_string(),
            header_row: 2,
            columns: vec![1, 3, 4],
            ..config()
        }
    }

    #[test]
    fn xlsx_sheet_uses_absolute_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_xlsx(dir.path());

        let table = load_workbook(&path, &xlsx_config()).unwrap();
        assert_eq!(table.columns, vec!["Date", "08:00", "24:00"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rows[0],
            vec![
                CellValue::DateTime(
                    chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap()
                ),
                CellValue::Text("<0,30".to_string()),
                CellValue::Number(0.4),
            ]
        );
        assert_eq!(
            table.rows[1],
            vec![CellValue::Empty, CellValue::Number(0.5), CellValue::Empty]
        );
    }

    #[test]
    fn xlsx_header_offset_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_xlsx(dir.path());

        // row 0 exists in absolute terms but is blank
        let mut cfg = xlsx_config();
        cfg.header_row = 0;
        assert!(matches!(
            load_workbook(&path, &cfg),
            Err(PipelineError::Parse { .. })
        ));

        cfg.header_row = 9;
        assert!(matches!(
            load_workbook(&path, &cfg),
            Err(PipelineError::Parse { .. })
        ));
    }

    #[test]
    fn missing_sheet_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_xlsx(dir.path());
        let mut cfg = xlsx_config();
        cfg.sheet = "Bruta".to_string();
        match load_workbook(&path, &cfg) {
            Err(PipelineError::Parse { message, .. }) => assert!(message.contains("Bruta")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn workbook_cells_convert() {
        assert_eq!(cell_from_data(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(cell_from_data(&Data::String(" ".into())), CellValue::Empty);
        assert_eq!(
            cell_from_data(&Data::DateTimeIso("2024-01-02T00:00:00".into())),
            CellValue::DateTime(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
    }
}
