// ハンドラーpanicの捕捉とスタックの切り詰め

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

/// ログ・レスポンスに残すスタックの最大行数
pub const MAX_STACK_LINES: usize = 10;

thread_local! {
    static LAST_STACK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// 回復したpanicの内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    /// panicメッセージ
    pub message: String,
    /// 切り詰めたスタック
    pub stack: Vec<String>,
}

/// panicフックを登録する（プロセスで1回だけ）
///
/// フックはpanicしたスレッドのスタックを保存してから既存のフックに処理を渡す。
/// `catch_unwind` は同じスレッドで巻き戻しを受け取るため、直後の `report` で取り出せる。
pub fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = truncate_stack(&Backtrace::force_capture().to_string());
            LAST_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// 先頭 `MAX_STACK_LINES` 行に切り詰める
pub fn truncate_stack(stack: &str) -> Vec<String> {
    stack
        .lines()
        .take(MAX_STACK_LINES)
        .map(str::to_string)
        .collect()
}

/// `catch_unwind` のペイロードからレポートを作る
pub fn report(payload: Box<dyn Any + Send>) -> PanicReport {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    let stack = LAST_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_default();
    PanicReport { message, stack }
}
