use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::rc::Rc;

use encoding_rs::Encoding;

use crate::document::LiveDocument;
use crate::host::{EventLoop, HostCapabilities};
use crate::parsers::html::{get_charset, html_to_dom, serialize_document};
use crate::substitution::{EnableConfig, Engine, EngineStats, Settings, SubstitutionError, SubstitutionResult};

const ANSI_COLOR_RED: &str = "\x1b[31m";
const ANSI_COLOR_RESET: &str = "\x1b[0m";
const DEFAULT_ENCODING: &str = "utf-8";

/// 离线处理选项
#[derive(Debug, Clone, Default)]
pub struct RelabelOptions {
    /// 输入编码；未指定时读取文档中的 `<meta charset>`，再退回 UTF-8
    pub encoding: Option<String>,
    /// 引擎设置（含词典）
    pub settings: Settings,
}

/// 对一份 HTML 数据执行一次完整替换
///
/// 启用引擎、运行事件循环直到空闲、停用（保留替换结果），最后按输入编码序列化。
///
/// # Examples
///
/// ```
/// use relabel::core::{relabel_document_from_data, RelabelOptions};
/// use relabel::substitution::Dictionary;
///
/// let mut options = RelabelOptions::default();
/// options.settings.mapping = Dictionary::from_iter([("Run", "运行")]);
///
/// let (output, stats) =
///     relabel_document_from_data(b"<div><button>Run</button></div>".to_vec(), &options).unwrap();
/// assert!(String::from_utf8(output).unwrap().contains("<button>运行</button>"));
/// assert!(stats.substitutions >= 1);
/// ```
pub fn relabel_document_from_data(
    input_data: Vec<u8>,
    options: &RelabelOptions,
) -> SubstitutionResult<(Vec<u8>, EngineStats)> {
    let mut document_encoding = options
        .encoding
        .clone()
        .unwrap_or_else(|| DEFAULT_ENCODING.to_string());
    let mut dom = html_to_dom(&input_data, &document_encoding)?;

    if options.encoding.is_none() {
        if let Some(charset) = get_charset(&dom.document) {
            if !charset.eq_ignore_ascii_case(&document_encoding) {
                if Encoding::for_label(charset.as_bytes()).is_some() {
                    tracing::debug!("按文档声明的编码 {} 重新解析", charset);
                    dom = html_to_dom(&input_data, &charset)?;
                    document_encoding = charset;
                } else {
                    tracing::warn!("忽略无法识别的文档编码 {}", charset);
                }
            }
        }
    }

    let document = Rc::new(LiveDocument::new(dom));
    let event_loop = Rc::new(EventLoop::new(HostCapabilities::full()));
    event_loop.watch(&document);

    let engine = Engine::new(document.clone(), event_loop.clone(), options.settings.clone());
    engine.enable(EnableConfig::default());
    event_loop.run_until_idle();
    engine.disable(false);
    let stats = engine.stats();

    let output = serialize_document(document.document(), &document_encoding)?;
    Ok((output, stats))
}

/// 读取文件（`-` 表示标准输入）并执行替换
pub fn relabel_document(
    target: &str,
    options: &RelabelOptions,
) -> SubstitutionResult<(Vec<u8>, EngineStats)> {
    let input_data = if target == "-" {
        let mut data = Vec::new();
        io::stdin()
            .read_to_end(&mut data)
            .map_err(|e| SubstitutionError::from(e).with_context("stdin"))?;
        data
    } else {
        let path = Path::new(target);
        if !path.exists() {
            return Err(SubstitutionError::Io(format!("File not found: {target}")));
        }
        fs::read(path).map_err(|e| SubstitutionError::from(e).with_context(target))?
    };

    relabel_document_from_data(input_data, options)
}

/// Prints an error message to stderr
pub fn print_error_message(msg: &str) {
    eprintln!("{ANSI_COLOR_RED}{msg}{ANSI_COLOR_RESET}");
}
