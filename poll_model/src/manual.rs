/*!

This is the long-form manual for `poll_model` and `pollcast`.

## Input formats

The following formats are supported:
* `csv` Comma Separated Values with a header row
* `xlsx` Excel workbooks (first worksheet, or the one named by `excelWorksheetName`)

Both formats expect one poll per row and the following columns, in any order:

| column           | content                                                  |
|------------------|----------------------------------------------------------|
| `pollster`       | the organization that ran the poll                      |
| `candidate_name` | the candidate the support refers to                     |
| `population`     | the sampled population (`lv`, `rv`, `a`, `v`, ...)      |
| `numeric_grade`  | the quality grade of the pollster (may be empty for rows that are only predicted) |
| `end_date`       | the end of the fieldwork (`2024-10-30`, `10/30/24` or `10/30/2024`) |
| `pct`            | the support, in percent (may be empty for rows that are only predicted) |
| `state`          | optional: the state of a state-level poll, empty for a national poll |
| `national`       | optional: an explicit `true`/`false` national flag       |
| `id`             | optional: a row identifier                               |

Rows that cannot be read (missing pollster, unreadable date, a `pct` that is
not a number between 0 and 100, a row with a `pct` but no grade, ...) are left
out and counted; they never stop the run. A poll without a grade never passes
the grade threshold.

## The model

The support is modelled as

```text
pct = intercept + pollster effect + population effect + recency effect + noise
noise ~ Normal(0, sigma)
```

Each categorical attribute is dummy-encoded. The levels are sorted and the
first one is the reference level: its effect is zero, and every other effect
is read as a difference from it. A poll is recent when its fieldwork ended at
most `recencyWindowDays` (default 30) before the reference date.

The priors follow the usual weakly informative defaults, scaled to the data:

* every effect: `Normal(0, 2.5 * sd(pct) / sd(indicator))`
* the intercept, with all the indicators centred: `Normal(mean(pct), 2.5 * sd(pct))`
* sigma: `Exponential(1 / sd(pct))`

The default estimation runs 4 Gibbs chains of 2000 iterations, discarding the
first 1000 of each. The point estimate of each coefficient is its posterior
median, reported with a central credible interval (95% by default).

### Convergence

For each parameter, the split `R̂` and the effective sample size are
reported. A parameter is flagged when `R̂ > 1.1` or when its effective sample
size is below 10% of the number of draws. Flags are warnings: the model is
still produced and saved.

### Predictions for unknown pollsters

A pollster or population that did not appear in the training polls is
predicted as the reference level. The number of such rows is logged and
reported.

## Configuration

The configuration file is a JSON document:

```json
{
  "candidateName": "Kamala Harris",
  "trainingSource": { "provider": "csv", "filePath": "polls.csv" },
  "predictionSources": {
    "national": { "provider": "csv", "filePath": "national.csv" },
    "state": { "provider": "xlsx", "filePath": "state.xlsx", "excelWorksheetName": "polls" }
  },
  "filter": { "minGrade": 2.7, "minDate": "2024-07-21" },
  "model": {
    "recencyWindowDays": 30,
    "referenceDate": "2024-11-01",
    "credibleLevel": 0.95,
    "chainCount": 4,
    "iterationsPerChain": 2000,
    "warmupIterations": 1000,
    "seed": 853,
    "algorithm": "sampling",
    "maxWallSeconds": 600
  },
  "outputSettings": {
    "outputDirectory": "out",
    "modelFile": "model.json",
    "nationalPredictionsFile": "national_predictions.csv",
    "statePredictionsFile": "state_predictions.csv"
  }
}
```

File paths are relative to the directory of the configuration file. Most of
the settings can be overridden on the command line, see `pollcast --help`.

*/
