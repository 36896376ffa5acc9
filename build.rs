use vergen::EmitBuilder;

fn main() {
    // 生成构建信息（时间戳、git 提交），供启动日志使用
    if let Err(e) = EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
    {
        println!("cargo:warning=无法生成构建信息: {}", e);
    }
}
