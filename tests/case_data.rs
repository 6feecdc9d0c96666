use pydemic::data::{date_to_day, day_to_date, parse_date};
use pydemic::io::case_data::{load_case_data_csv, write_frame_csv};
use pydemic::io::population::load_age_distribution_csv;
use pydemic::DataFrame;

#[test]
fn dates_become_days_since_2020() {
    assert_eq!(date_to_day(parse_date("2020-01-01").expect("date")), 0.0);
    assert_eq!(date_to_day(parse_date("2020-03-01").expect("date")), 60.0);
    assert!(parse_date("03/01/2020").is_err());
}

#[test]
fn days_outside_the_calendar_have_no_date() {
    assert_eq!(day_to_date(60.7), parse_date("2020-03-01").ok());
    assert_eq!(day_to_date(-1.0), parse_date("2019-12-31").ok());
    for day in [1e15, -1e15, 1e300, f64::NAN, f64::INFINITY] {
        assert_eq!(day_to_date(day), None, "{day}");
    }

    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("far.csv");
    let frame = DataFrame::new(vec![0.0, 1e15]).with_column("cases", vec![1.0, 2.0]).expect("frame");
    write_frame_csv(&path, &frame).expect("write");
    let text = std::fs::read_to_string(&path).expect("read");
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows[1], "0,2020-01-01,1");
    assert_eq!(rows[2], "1000000000000000,,2");
}

#[test]
fn loads_dated_case_counts_with_gaps() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("cases.csv");
    std::fs::write(
        &path,
        "date,positive,dead\n2020-03-01,10,0\n2020-03-02,,1\n2020-03-03,17,\n",
    )
    .expect("write");

    let frame = load_case_data_csv(&path).expect("load");
    assert_eq!(frame.t, vec![60.0, 61.0, 62.0]);
    let positive = frame.column("positive").expect("positive");
    assert_eq!(positive[0], 10.0);
    assert!(positive[1].is_nan());
    assert!(frame.column("dead").expect("dead")[2].is_nan());
}

#[test]
fn unsorted_or_unindexed_files_are_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let unsorted = tmp.path().join("unsorted.csv");
    std::fs::write(&unsorted, "t,cases\n5,1\n4,2\n").expect("write");
    assert!(load_case_data_csv(&unsorted).is_err());

    let no_index = tmp.path().join("no_index.csv");
    std::fs::write(&no_index, "day,cases\n5,1\n").expect("write");
    assert!(load_case_data_csv(&no_index).is_err());
}

#[test]
fn written_frames_load_back() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("out.csv");
    let frame = DataFrame::new(vec![70.0, 71.0, 72.0])
        .with_column("infected", vec![1.5, 2.5, f64::NAN])
        .expect("column");
    write_frame_csv(&path, &frame).expect("write");

    let text = std::fs::read_to_string(&path).expect("read");
    assert!(text.starts_with("t,date,infected\n70,2020-03-11,1.5\n"), "{text}");

    let back = load_case_data_csv(&path).expect("load");
    assert_eq!(back.t, frame.t);
    assert_eq!(back.column("infected").expect("infected")[..2], [1.5, 2.5]);
    assert!(back.column("infected").expect("infected")[2].is_nan());
}

#[test]
fn age_distribution_csv() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("ages.csv");
    std::fs::write(&path, "age,count\n0,300\n20,500\n60,200\n").expect("write");
    let ages = load_age_distribution_csv(&path).expect("load");
    assert_eq!(ages.bin_edges, vec![0.0, 20.0, 60.0]);
    assert_eq!(ages.fractions(), vec![0.3, 0.5, 0.2]);

    std::fs::write(&path, "age,count\n0,300\n20,-5\n").expect("write");
    assert!(load_age_distribution_csv(&path).is_err());
}
