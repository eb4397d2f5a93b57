// tests/common/mod.rs
// Shared document generator for integration tests
#![allow(dead_code)]

use quillbase_core::{Document, DocumentPtr};
use serde_json::json;

pub fn gen_id(num: i64) -> String {
    format!("{:024}", num)
}

fn gen_array(num: i64) -> Vec<i64> {
    (num..num + 5).collect()
}

fn gen_dict(num: i64) -> serde_json::Value {
    json!({
        "odd": num % 2 != 0,
        "even": num % 2 == 0,
        "three": num % 3 == 0,
        "five": num % 5 == 0,
    })
}

pub fn gen_doc(num: i64) -> DocumentPtr {
    let nested_array: Vec<Vec<i64>> = (0..5).map(|i| gen_array(num + i)).collect();
    let dict_array: Vec<serde_json::Value> =
        (0..5).map(|i| json!({ "number": num + i })).collect();
    let mut mixed_dict = serde_json::Map::new();
    for i in 0..5 {
        mixed_dict.insert((num + i).to_string(), gen_dict(num + i));
    }
    let value = json!({
        "_id": gen_id(num),
        "count": num,
        "countStr": num.to_string(),
        "countDouble": num as f64 + 0.1,
        "countBool": num % 2 != 0,
        "countArray": gen_array(num),
        "countDict": gen_dict(num),
        "nestedArray": nested_array,
        "dictArray": dict_array,
        "mixedDict": mixed_dict,
    });
    Document::from_json(&value.to_string()).expect("generated document parses")
}
