#![allow(dead_code)]

//! A miniature `web.cordova` build, as the toolchain leaves it on disk.

use std::fs;
use std::path::Path;

pub const BUNDLE_JS: &str = r#"(function () {
Meteor.isCordova = true;
Meteor.startup(function () {
  if (Package.meteor.Meteor.isCordova) {
    WebAppLocalServer.startupDidComplete(function () {});
  }
});
})();
"#;

pub const APP_JS: &str = "if (Meteor.isCordova) { console.log('mobile'); }\n";

pub const MANIFEST_JSON: &str = r#"{
  "format": "web-program-pre1",
  "manifest": [
    {"path": "packages/meteor.js?hash=abc", "where": "client", "type": "js", "url": "/packages/meteor.js"},
    {"path": "app/app.js", "where": "client", "type": "js", "url": "/app/app.js"},
    {"path": "merged-stylesheets.css", "where": "client", "type": "css", "url": "/merged-stylesheets.css"}
  ]
}"#;

pub const RUNTIME_CONFIG_JSON: &str = r#"{"meteorRelease":"METEOR@1.4.2.3","ROOT_URL":"http://10.0.0.2:3000/","DDP_DEFAULT_CONNECTION_URL":"http://10.0.0.2:3000/"}"#;

/// A cordova `index.html` embedding [`RUNTIME_CONFIG_JSON`].
pub fn index_html() -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n",
            "<script type=\"text/javascript\">__meteor_runtime_config__ = ",
            "JSON.parse(decodeURIComponent(\"{}\"));</script>\n",
            "<script type=\"text/javascript\" src=\"/cordova.js\"></script>\n",
            "<script type=\"text/javascript\" src=\"/packages/meteor.js\"></script>\n",
            "</head>\n<body></body>\n</html>\n"
        ),
        urlencoding::encode(RUNTIME_CONFIG_JSON)
    )
}

/// Write a complete build into `build_dir`.
pub fn write_cordova_build(build_dir: &Path) {
    write_build_without_documents(build_dir);
    fs::write(build_dir.join("index.html"), index_html()).expect("write index.html");
    fs::write(build_dir.join("program.json"), MANIFEST_JSON).expect("write program.json");
}

/// Write the scripts and styles of a build, but not `index.html` and
/// `program.json`, as the server strategy finds it.
pub fn write_build_without_documents(build_dir: &Path) {
    fs::create_dir_all(build_dir.join("packages")).expect("create packages dir");
    fs::create_dir_all(build_dir.join("app")).expect("create app dir");
    fs::write(build_dir.join("packages/meteor.js"), BUNDLE_JS).expect("write meteor.js");
    fs::write(build_dir.join("app/app.js"), APP_JS).expect("write app.js");
    fs::write(build_dir.join("merged-stylesheets.css"), "body {}\n").expect("write css");
}
