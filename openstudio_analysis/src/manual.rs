/*!

This is the long-form manual for `openstudio_analysis` and `osatrans`.

## Input workbooks

An analysis is described by a workbook with three sheets: `Setup`, `Variables` and
`Outputs`. Two kinds of workbooks are accepted:
* an Excel file (`.xlsx`),
* a directory holding one CSV file per sheet: `Setup.csv`, `Variables.csv`,
  `Outputs.csv` (the lower-case names `setup.csv` etc. are also accepted).

CSV cells are plain text. Numbers and booleans are recognized when the cell is read.

## The `Setup` sheet

The first column holds either a section banner or the key of a row. Rows before the first
banner are ignored, as are rows with a blank first column. The sections are:

| Banner                          | Rows                                  |
|---------------------------------|---------------------------------------|
| `Settings`                      | `key` \| `value`                      |
| `Running Setup`                 | `key` \| `value`                      |
| `Problem Definition`            | `key` \| `value`                      |
| `Algorithm Setup`               | `key` \| `value`                      |
| `Weather Files`                 | `Weather File` \| path or glob        |
| `Models`                        | `Model` \| display name \| path       |
| `Other Library Files`           | label \| library name \| path         |
| `Worker Initialization Scripts` | name \| path \| arguments             |
| `Worker Finalization Scripts`   | name \| path \| arguments             |

Keys are converted to snake case: `Number of Samples` becomes `number_of_samples`.
Relative paths are resolved against the directory of the workbook.

Notable keys:
- `Settings` / `Spreadsheet Version` (required) selects the layout of the other sheets.
  Versions older than 0.1.9 are rejected.
- `Running Setup` / `Analysis Name`: defaults to the file name of the workbook.
- `Running Setup` / `Measure Directory`: may be repeated. Each row adds a directory in which
  measures are searched, in order. Defaults to `measures` next to the workbook.
- `Running Setup` / `Export Directory`: where the documents and archives are written.
  Defaults to `export` next to the workbook. It is created if needed.
- `Algorithm Setup`: `Number of Samples`, `Seed`, `Max Queued Jobs`, `Number of Generations`
  and `Population Size` must be integers. `Debug Messages` and `Run Baseline` are booleans.

`Allow Multiple Jobs` and `Use Server as Worker` are not accepted anymore.

## The `Variables` sheet

The header row is found by matching the header texts. The columns depend on the
spreadsheet version; the main ones are:

| Header                         | Measure row       | Argument / variable row     |
|--------------------------------|-------------------|-----------------------------|
| `Enabled`                      | `TRUE` / `FALSE`  | blank                       |
| `Type`                         | measure name      | `argument`, `variable`, `pivot` |
| `Parameter Display Name`       | class name        | display name                |
| `Measure Directory` (0.1.11)   | directory         |                             |
| `Parameter Name in Measure`    | measure type      | argument name               |
| `Variable Type`                |                   | `double`, `integer`, `bool`, `string`, `choice` |
| `Static / Default Value`       |                   | value of an argument        |
| `Distribution`                 |                   | `uniform`, `triangle`, `normal`, `lognormal`, `discrete` |
| `Min`, `Max`, `Mean`, `Std Dev`|                   | continuous distributions    |
| `Discrete Values` (0.1.10)     |                   | comma-separated values      |
| `Discrete Weights` (0.1.10)    |                   | comma-separated weights     |

A row with a filled `Enabled` cell starts a measure. The rows below it describe its
arguments and variables, until the next measure row. When the measure directory is not
given, it is derived from the class name: `SetWindowToWallRatioByFacade` is searched as
`set_window_to_wall_ratio_by_facade`.

Arguments hold a fixed value. Variables are sampled by the algorithm and must carry a
complete distribution. Pivots enumerate discrete values into parallel analyses.

## The `Outputs` sheet

One row per output: `Variable Display Name`, `Name`, `Units`, `Objective Function`
(`TRUE`/`FALSE`), `Objective Function Target`, `Scale` and `Objective Function Group`.
Objective functions are numbered in order. When the group is not given, objective functions
get the groups 1, 2, 3, ...

## Outputs

For every seed model `<name>`, the export directory receives:
- `<name>.json`: the analysis document,
- `<name>.zip`: the archive with `seed/`, `weather/`, `measures/` and `lib/` directories.

## Command line

`osatrans --input <workbook>` reads, validates and writes the documents and archives. The
other options are:
- `--measure-paths <dir>...`: search these directories for measures instead,
- `--export-path <dir>`: write to this directory instead,
- `--seed-models <file>...`: use these seed models instead of the `Models` section,
- `--reference <file>`: fail if the document of the first seed model differs from this one,
- `--check`: stop after validation,
- `--verbose`: debug logging.

*/
