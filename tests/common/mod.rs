// 集成测试公共模块
//
// 提供测试辅助工具和共享功能

#![allow(dead_code)]

use std::rc::Rc;

use markup5ever_rcdom::Handle;

use relabel::document::LiveDocument;
use relabel::host::{EventLoop, HostCapabilities};
use relabel::parsers::html::{descendant_elements, get_node_attr, serialize_document, text_content};
use relabel::substitution::{Dictionary, EnableConfig, Engine, Settings};

/// 测试环境：文档 + 事件循环 + 引擎
pub struct TestEnvironment {
    pub event_loop: Rc<EventLoop>,
    pub document: Rc<LiveDocument>,
    pub engine: Rc<Engine>,
}

impl TestEnvironment {
    pub fn new(html: &str, entries: &[(&str, &str)]) -> Self {
        Self::with_settings(html, entries, Settings::default(), HostCapabilities::full())
    }

    pub fn with_settings(
        html: &str,
        entries: &[(&str, &str)],
        mut settings: Settings,
        capabilities: HostCapabilities,
    ) -> Self {
        settings.mapping = dictionary(entries);
        let event_loop = Rc::new(EventLoop::new(capabilities));
        let document = Rc::new(LiveDocument::parse(html).expect("test html parses"));
        event_loop.watch(&document);
        let engine = Engine::new(document.clone(), event_loop.clone(), settings);

        Self {
            event_loop,
            document,
            engine,
        }
    }

    /// 启用并运行到空闲
    pub fn enable(&self) {
        self.engine.enable(EnableConfig::default());
        self.event_loop.run_until_idle();
    }

    pub fn by_id(&self, id: &str) -> Handle {
        HtmlTestHelper::find_by_id(&self.document, id)
    }

    pub fn text_of(&self, id: &str) -> String {
        text_content(&self.by_id(id))
    }

    pub fn attr_of(&self, id: &str, name: &str) -> Option<String> {
        get_node_attr(&self.by_id(id), name)
    }

    pub fn snapshot(&self) -> String {
        HtmlTestHelper::snapshot(&self.document)
    }
}

pub fn dictionary(entries: &[(&str, &str)]) -> Dictionary {
    entries.iter().copied().collect()
}

/// HTML测试工具
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn find_by_id(document: &LiveDocument, id: &str) -> Handle {
        descendant_elements(document.document())
            .into_iter()
            .find(|el| get_node_attr(el, "id").as_deref() == Some(id))
            .unwrap_or_else(|| panic!("no element with id '{}'", id))
    }

    /// 序列化后的整份文档，用于结构比较
    pub fn snapshot(document: &LiveDocument) -> String {
        let bytes = serialize_document(document.document(), "utf-8").expect("serializes");
        String::from_utf8(bytes).expect("utf-8 output")
    }

    /// 典型的应用界面：工具栏按钮、设置面板、带属性的输入
    pub fn create_studio_page() -> String {
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Studio</title>
    <meta charset="UTF-8">
</head>
<body>
    <nav id="nav">
        <a id="nav-playground" href="/playground">Playground</a>
        <a id="nav-gallery" href="/gallery" title="Gallery">Gallery</a>
    </nav>
    <div id="toolbar">
        <button id="run">Run</button>
        <button id="save" aria-label="Save">Save</button>
        <span id="running">Running</span>
    </div>
    <div id="panel">
        <input id="search" type="text" placeholder="Settings">
        <img id="logo" src="logo.png" alt="Settings">
    </div>
    <script id="script">var label = "Run";</script>
    <pre id="pre">Run</pre>
</body>
</html>"#
            .to_string()
    }

    /// 含长段落的页面
    pub fn create_prose_page() -> String {
        format!(
            r#"<body>
    <div id="short"><button id="short-run">Run</button></div>
    <p id="long">Press <b id="long-run">Run</b> {}</p>
</body>"#,
            "to execute every cell in the notebook, then review the output carefully. ".repeat(2)
        )
    }
}

/// 断言工具
pub struct AssertionHelper;

impl AssertionHelper {
    pub fn assert_text(env: &TestEnvironment, id: &str, expected: &str) {
        let actual = env.text_of(id);
        assert_eq!(actual, expected, "text of #{}", id);
    }

    pub fn assert_attr(env: &TestEnvironment, id: &str, name: &str, expected: Option<&str>) {
        let actual = env.attr_of(id, name);
        assert_eq!(actual.as_deref(), expected, "attribute {} of #{}", name, id);
    }
}

/// 界面常用词条
pub const STUDIO_ENTRIES: &[(&str, &str)] = &[
    ("Playground", "实验场"),
    ("Gallery", "画廊"),
    ("Run", "运行"),
    ("Save", "保存"),
    ("Settings", "设置"),
];
