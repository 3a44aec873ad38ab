use temple_core::{compile, Value};

fn main() {
    let source = "<ul>{% for item in items %}<li>{{ item.name | upper }}</li>{% endfor %}</ul>\n{{ missing }}";
    let context = Value::from_json(br#"{"items": [{"name": "ada"}, {"name": "<grace>"}]}"#).unwrap();

    println!("Template: {:?}\n", source);

    let template = compile(source).unwrap();
    let rendered = template.render(&context);

    println!("Output:\n{}\n", rendered.output);
    println!("Diagnostics:");
    for diagnostic in &rendered.diagnostics {
        println!("  {}", diagnostic);
    }
}
